use esp_idf_svc::nvs::{EspDefaultNvs, EspDefaultNvsPartition};
use niobe::settings::BoardSettings;

const NAMESPACE: &str = "niobe";
const SETTINGS_KEY: &str = "board";

/// Loads the board settings from NVS, falling back to defaults when none were stored
pub fn load(partition: EspDefaultNvsPartition) -> Result<BoardSettings, anyhow::Error> {
    let nvs = EspDefaultNvs::new(partition, NAMESPACE, true)?;

    match get_string(&nvs, SETTINGS_KEY)? {
        Some(json) => Ok(BoardSettings::from_json(&json)?),
        None => Ok(BoardSettings::default()),
    }
}

fn get_string(nvs: &EspDefaultNvs, key: &str) -> Result<Option<String>, anyhow::Error> {
    let len = nvs.str_len(key)?;
    if let Some(len) = len {
        let mut buf = vec![0u8; len];
        Ok(nvs.get_str(key, &mut buf)?.map(|s| s.trim_end_matches('\0').into()))
    } else {
        Ok(None)
    }
}
