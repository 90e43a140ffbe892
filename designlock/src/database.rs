//! Design database accessor.
//!
//! The YAML database is loaded once into a mapping. Sections are read on
//! demand into typed records. A checker that cannot work without a section
//! asks for it through a `require_*` accessor and gets
//! [`DatabaseError::MissingSection`] instead of an empty default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::units::{normalize_as, Unit};

static GPIO_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GPIO(\d+)$").expect("gpio key pattern"));

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("design database not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML syntax error: {0}")]
    Syntax(#[from] serde_yaml::Error),
    #[error("database root is not a mapping")]
    NotAMapping,
    #[error("required section '{0}' is missing")]
    MissingSection(String),
    #[error("section '{section}' is malformed: {message}")]
    MalformedSection { section: String, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(deserialize_with = "opt_scalar")]
    pub project: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub revision: Option<String>,
    pub frozen: Option<bool>,
    #[serde(deserialize_with = "opt_scalar")]
    pub board_size: Option<String>,
    pub mounting_holes: Vec<HolePosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawHole")]
pub struct HolePosition {
    pub x: f64,
    pub y: f64,
}

/// Holes are written either as `[x, y]` or as `{x: .., y: ..}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawHole {
    Pair([f64; 2]),
    Point { x: f64, y: f64 },
}

impl From<RawHole> for HolePosition {
    fn from(raw: RawHole) -> Self {
        match raw {
            RawHole::Pair([x, y]) => HolePosition { x, y },
            RawHole::Point { x, y } => HolePosition { x, y },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ic {
    #[serde(deserialize_with = "opt_scalar")]
    pub part: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub manufacturer: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub description: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub output_voltage: Option<String>,
}

impl Ic {
    /// `output_voltage` in volts; `3.3` and `"3.3V"` both read as 3.3.
    pub fn output_voltage_volts(&self) -> Option<f64> {
        let raw = self.output_voltage.as_deref()?;
        normalize_as(raw, Unit::Volt)
            .ok()
            .filter(|q| q.unit == Unit::Volt)
            .map(|q| q.value)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    #[serde(deserialize_with = "opt_scalar")]
    pub value: Option<String>,
    pub locked: bool,
    #[serde(deserialize_with = "opt_scalar")]
    pub ic: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub description: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub calculation: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    pub part_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawGpioPin {
    #[serde(deserialize_with = "opt_scalar")]
    function: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    direction: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    peripheral: Option<String>,
    #[serde(deserialize_with = "opt_scalar")]
    description: Option<String>,
}

/// One `gpio_pins` entry whose key is a valid `GPIO<n>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpioAssignment {
    pub key: String,
    pub number: u32,
    pub function: Option<String>,
    pub direction: Option<String>,
    pub peripheral: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GpioTable {
    /// Sorted by GPIO number, then key.
    pub pins: Vec<GpioAssignment>,
    /// Keys that are not `GPIO<digits>`.
    pub invalid_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IcRequirement {
    #[serde(deserialize_with = "opt_scalar")]
    pub description: Option<String>,
    pub required: Vec<String>,
    pub recommended: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannedComponent {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannedNet {
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageBand {
    #[serde(alias = "min")]
    pub voltage_min: f64,
    #[serde(alias = "max")]
    pub voltage_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonLadder {
    pub fault_low_threshold: f64,
    pub fault_high_threshold: f64,
    pub bands: BTreeMap<String, VoltageBand>,
}

/// One `verification_rules.locked_values` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedValueEntry {
    pub component: String,
    #[serde(deserialize_with = "scalar")]
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// What a component's `ic` field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcReference {
    Ic,
    Connector,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DesignDatabase {
    source: Option<PathBuf>,
    root: Mapping,
}

impl DesignDatabase {
    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        if !path.exists() {
            return Err(DatabaseError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut db = Self::from_yaml_str(&text)?;
        db.source = Some(path.to_path_buf());
        tracing::debug!(
            "Loaded design database {} ({} sections)",
            path.display(),
            db.root.len()
        );
        Ok(db)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, DatabaseError> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(root) => Ok(Self { source: None, root }),
            _ => Err(DatabaseError::NotAMapping),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.root.contains_key(name)
    }

    pub fn section_names(&self) -> Vec<String> {
        self.root
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect()
    }

    pub fn get_section(&self, name: &str) -> Option<&Value> {
        self.root.get(name)
    }

    pub fn require_section(&self, name: &str) -> Result<&Value, DatabaseError> {
        self.get_section(name)
            .ok_or_else(|| DatabaseError::MissingSection(name.to_string()))
    }

    /// Section as a mapping, for checks that look at raw keys.
    pub fn section_mapping(&self, name: &str) -> Option<&Mapping> {
        self.get_section(name).and_then(Value::as_mapping)
    }

    /// Deserialize an optional section. `Ok(None)` when absent.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, DatabaseError> {
        self.get_section(name)
            .map(|value| decode(name, value))
            .transpose()
    }

    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, DatabaseError> {
        decode(name, self.require_section(name)?)
    }

    pub fn metadata(&self) -> Result<Metadata, DatabaseError> {
        self.require("metadata")
    }

    pub fn ics(&self) -> Result<BTreeMap<String, Ic>, DatabaseError> {
        self.require("ics")
    }

    pub fn components(&self) -> Result<BTreeMap<String, Component>, DatabaseError> {
        self.require("components")
    }

    pub fn power_rail_names(&self) -> Result<Vec<String>, DatabaseError> {
        let rails: BTreeMap<String, Value> = self.require("power_rails")?;
        Ok(rails.into_keys().collect())
    }

    pub fn gpio_pins(&self) -> Result<GpioTable, DatabaseError> {
        let raw: BTreeMap<String, RawGpioPin> = self.require("gpio_pins")?;
        let mut table = GpioTable::default();
        for (key, pin) in raw {
            let number = GPIO_KEY_RE
                .captures(&key)
                .and_then(|caps| caps[1].parse::<u32>().ok());
            match number {
                Some(number) => table.pins.push(GpioAssignment {
                    key,
                    number,
                    function: pin.function,
                    direction: pin.direction,
                    peripheral: pin.peripheral,
                    description: pin.description,
                }),
                None => {
                    tracing::warn!("gpio_pins key '{}' is not GPIO<n>; skipped", key);
                    table.invalid_keys.push(key);
                }
            }
        }
        table
            .pins
            .sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.key.cmp(&b.key)));
        Ok(table)
    }

    pub fn ic_requirements(&self) -> Result<BTreeMap<String, IcRequirement>, DatabaseError> {
        self.require("ic_required_components")
    }

    pub fn banned_components(&self) -> Result<Option<Vec<BannedComponent>>, DatabaseError> {
        self.section("banned_components")
    }

    pub fn banned_nets(&self) -> Result<Option<Vec<BannedNet>>, DatabaseError> {
        self.section("banned_nets")
    }

    pub fn button_ladder(&self) -> Result<ButtonLadder, DatabaseError> {
        self.require("button_ladder")
    }

    pub fn firmware_constants(&self) -> Result<Option<BTreeMap<String, Value>>, DatabaseError> {
        self.section("firmware_constants")
    }

    /// `verification_rules.locked_values`; empty when either level is absent.
    pub fn locked_values(&self) -> Result<Vec<LockedValueEntry>, DatabaseError> {
        let Some(list) = self
            .section_mapping("verification_rules")
            .and_then(|rules| rules.get("locked_values"))
        else {
            return Ok(Vec::new());
        };
        decode("verification_rules.locked_values", list)
    }

    /// Resolve a component's `ic` field against the IC table and the
    /// connector pseudo-ICs.
    pub fn resolve_ic_reference(
        &self,
        ic_ref: &str,
        connectors: &[String],
    ) -> Result<IcReference, DatabaseError> {
        let ics = self.ics()?;
        Ok(if ics.contains_key(ic_ref) {
            IcReference::Ic
        } else if connectors.iter().any(|c| c == ic_ref) {
            IcReference::Connector
        } else {
            IcReference::Unknown
        })
    }
}

fn decode<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, DatabaseError> {
    serde_yaml::from_value(value.clone()).map_err(|e| DatabaseError::MalformedSection {
        section: name.to_string(),
        message: e.to_string(),
    })
}

/// String form of a YAML scalar; `None` for null, sequences and mappings.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        _ => None,
    }
}

fn opt_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value).ok_or_else(|| serde::de::Error::custom("expected a scalar value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = r#"
metadata:
  project: SEDU
  revision: C.4b
  frozen: true
  board_size: "80x50"
  mounting_holes:
    - [4, 4]
    - {x: 76, y: 46}
power_rails:
  VBAT: {nominal: 24}
  3V3: {nominal: 3.3}
ics:
  U4: {part: LMR33630ADDAR, manufacturer: TI, description: Buck, output_voltage: 3.3}
components:
  R_VBAT_TOP: {value: 140k, locked: true, ic: U1}
  R_COUNT: {value: 140000}
  J_PWR: {value: conn, ic: J_BAT}
gpio_pins:
  GPIO21: {function: SPI_MISO, direction: input, peripheral: SPI, description: MISO}
  GPIO4: {function: ADC_LADDER, direction: input, peripheral: ADC, description: ladder}
  PIN7: {function: BAD}
button_ladder:
  fault_low_threshold: 0.2
  fault_high_threshold: 3.4
  bands:
    START: {voltage_min: 0.75, voltage_max: 1.0}
    IDLE: {min: 1.55, max: 2.1}
verification_rules:
  locked_values:
    - {component: R_VBAT_TOP, value: 140k}
    - {component: RS_IN, value: 0.003}
"#;

    #[test]
    fn test_typed_sections() {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        let meta = db.metadata().unwrap();
        assert_eq!(meta.revision.as_deref(), Some("C.4b"));
        assert_eq!(meta.frozen, Some(true));
        assert_eq!(
            meta.mounting_holes,
            vec![HolePosition { x: 4.0, y: 4.0 }, HolePosition { x: 76.0, y: 46.0 }]
        );

        let components = db.components().unwrap();
        assert_eq!(components["R_COUNT"].value.as_deref(), Some("140000"));
        assert!(components["R_VBAT_TOP"].locked);
        assert!(!components["R_COUNT"].locked);

        assert_eq!(db.ics().unwrap()["U4"].output_voltage_volts(), Some(3.3));
        assert_eq!(db.power_rail_names().unwrap(), vec!["3V3", "VBAT"]);

        let ladder = db.button_ladder().unwrap();
        assert_eq!(ladder.bands["IDLE"].voltage_max, 2.1);

        let locks = db.locked_values().unwrap();
        assert_eq!(locks[1].value, "0.003");
    }

    #[test]
    fn test_gpio_table_sorted_with_invalid_keys() {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        let gpio = db.gpio_pins().unwrap();
        let numbers: Vec<u32> = gpio.pins.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![4, 21]);
        assert_eq!(gpio.invalid_keys, vec!["PIN7"]);
    }

    #[test]
    fn test_missing_and_malformed_sections() {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        assert!(matches!(
            db.ic_requirements(),
            Err(DatabaseError::MissingSection(ref s)) if s == "ic_required_components"
        ));
        assert!(db.banned_nets().unwrap().is_none());

        let bad = DesignDatabase::from_yaml_str("button_ladder: [1, 2]\n").unwrap();
        assert!(matches!(
            bad.button_ladder(),
            Err(DatabaseError::MalformedSection { .. })
        ));
    }

    #[test]
    fn test_ic_reference_resolution() {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        let connectors = vec!["J_BAT".to_string()];
        assert_eq!(db.resolve_ic_reference("U4", &connectors).unwrap(), IcReference::Ic);
        assert_eq!(
            db.resolve_ic_reference("J_BAT", &connectors).unwrap(),
            IcReference::Connector
        );
        assert_eq!(
            db.resolve_ic_reference("U1", &connectors).unwrap(),
            IcReference::Unknown
        );
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            DesignDatabase::from_yaml_str("- a\n- b\n"),
            Err(DatabaseError::NotAMapping)
        ));
        assert!(matches!(
            DesignDatabase::from_yaml_str("metadata: [unclosed\n"),
            Err(DatabaseError::Syntax(_))
        ));
        let missing = Path::new("/nonexistent/design_database.yaml");
        assert!(matches!(
            DesignDatabase::load(missing),
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design_database.yaml");
        std::fs::write(&path, DB).unwrap();
        let db = DesignDatabase::load(&path).unwrap();
        assert_eq!(db.source(), Some(path.as_path()));
        assert!(db.has_section("gpio_pins"));
    }
}
