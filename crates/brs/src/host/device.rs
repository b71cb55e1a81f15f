use super::filesystem::FileSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MODELS_CSV: &str = include_str!("../../data/models.csv");

/// Description of the emulated device, as the host sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub developer_id: String,
    pub friendly_name: String,
    pub device_model: String,
    pub firmware_version: String,
    pub client_id: String,
    #[serde(rename = "RIDA")]
    pub rida: String,
    pub country_code: String,
    pub time_zone: String,
    pub locale: String,
    pub clock_format: String,
    pub display_mode: String,
    pub default_font: String,
    pub max_simul_streams: u32,
    pub local_ips: Vec<String>,
    /// Persistent registry sections as `section.key -> value`. Kept for the
    /// host to hand back on the next launch; scripts have no registry
    /// component, so nothing in a run reads or writes it.
    pub registry: BTreeMap<String, String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            developer_id: "34c6fceca75e456f25e7e99531e2425c6c1de443".to_string(),
            friendly_name: "BrightScript Emulator".to_string(),
            device_model: "8000X".to_string(),
            firmware_version: "049.10E04111A".to_string(),
            client_id: "6c5bf3a5-b2a5-4918-824d-7691d5c85364".to_string(),
            rida: "f51ac698-bc60-4409-aae3-8fc3abc025c4".to_string(),
            country_code: "US".to_string(),
            time_zone: "US/Arizona".to_string(),
            locale: "en_US".to_string(),
            clock_format: "12h".to_string(),
            display_mode: "720p".to_string(),
            default_font: "Asap".to_string(),
            max_simul_streams: 2,
            local_ips: vec!["eth1,127.0.0.1".to_string()],
            registry: BTreeMap::new(),
        }
    }
}

/// Model number to `[name, type, generation, resolution]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTable(BTreeMap<String, [String; 4]>);

impl ModelTable {
    /// Parses `model,f1,f2,f3,f4` lines. Lines with too few columns are skipped.
    pub fn parse(csv: &str) -> Self {
        let models = csv
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut fields = line.split(',').map(str::trim);
                let model = fields.next()?.to_string();
                let mut columns: [String; 4] = Default::default();
                for column in &mut columns {
                    *column = fields.next()?.to_string();
                }
                Some((model, columns))
            })
            .collect();
        Self(models)
    }

    pub fn bundled() -> Self {
        Self::parse(MODELS_CSV)
    }

    pub fn get(&self, model: &str) -> Option<&[String; 4]> {
        self.0.get(model)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the run can ask about the device it runs on.
pub struct DeviceContext {
    pub info: DeviceInfo,
    pub models: ModelTable,
    pub file_system: FileSystem,
}

impl DeviceContext {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            models: ModelTable::bundled(),
            file_system: FileSystem::default(),
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.models
            .get(&self.info.device_model)
            .map(|columns| columns[0].as_str())
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new(DeviceInfo::default())
    }
}
