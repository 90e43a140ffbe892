//! Rule tables and project layout.
//!
//! [`RuleConfig::default()`] is the frozen Rev C.4b rule set. An override
//! file (YAML or JSON) may replace any table; fields it leaves out keep
//! their defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::Severity;
use crate::units::{HOLE_TOLERANCE_MM, OUTLINE_TOLERANCE_MM, VOLTAGE_TOLERANCE_V};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read rule file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML rule file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON rule file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported rule file extension: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub paths: ProjectPaths,
    pub schema: SchemaRules,
    pub value_locks: ValueLockRules,
    pub pinmap: PinMapRules,
    pub netlabels: NetLabelRules,
    pub banned: BannedRules,
    pub geometry: GeometryRules,
    pub ladder: LadderRules,
    pub bom: BomRules,
    pub docs_index: DocsIndexRules,
}

impl RuleConfig {
    /// Read an override file, `.yaml`/`.yml` or `.json`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::info!("Loaded rule overrides from {}", path.display());
        Ok(config)
    }
}

/// Where each artifact lives, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectPaths {
    pub database: PathBuf,
    pub bom: PathBuf,
    pub net_labels: PathBuf,
    pub pin_header: PathBuf,
    pub ladder_source: PathBuf,
    pub pcb: PathBuf,
    pub docs_index: PathBuf,
    pub ladder_doc: PathBuf,
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self {
            database: "design_database.yaml".into(),
            bom: "hardware/BOM_Seed.csv".into(),
            net_labels: "hardware/Net_Labels.csv".into(),
            pin_header: "firmware/include/pins.h".into(),
            ladder_source: "firmware/src/input_ladder.cpp".into(),
            pcb: "hardware/SEDU_PCB.kicad_pcb".into(),
            docs_index: "docs/DOCS_INDEX.md".into(),
            ladder_doc: "docs/Button_Ladder.md".into(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A firmware constant naming a divider and the component it depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantLink {
    pub constant: String,
    pub component: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRules {
    pub required_sections: Vec<String>,
    pub required_metadata: Vec<String>,
    pub required_ic_fields: Vec<String>,
    pub required_gpio_fields: Vec<String>,
    /// Pseudo-ICs a component's `ic` field may name besides real ICs.
    pub connector_refs: Vec<String>,
    pub constant_links: Vec<ConstantLink>,
}

impl Default for SchemaRules {
    fn default() -> Self {
        Self {
            required_sections: strings(&["metadata", "power_rails", "ics", "components", "gpio_pins"]),
            required_metadata: strings(&["project", "revision", "frozen", "board_size"]),
            required_ic_fields: strings(&["part", "manufacturer", "description"]),
            required_gpio_fields: strings(&["function", "direction", "peripheral", "description"]),
            connector_refs: strings(&["J_LCD", "J_BAT", "J_MOT"]),
            constant_links: vec![
                ConstantLink {
                    constant: "VBAT_DIVIDER_TOP".into(),
                    component: "R_VBAT_TOP".into(),
                },
                ConstantLink {
                    constant: "VBAT_DIVIDER_BOT".into(),
                    component: "R_VBAT_BOT".into(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedLock {
    pub reference: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueLockRules {
    pub expected: Vec<ExpectedLock>,
    /// Severity for a correct value that lacks `locked: true`.
    pub unlocked_severity: Severity,
    pub frozen_board_size: String,
}

impl Default for ValueLockRules {
    fn default() -> Self {
        let lock = |reference: &str, value: &str, reason: &str| ExpectedLock {
            reference: reference.into(),
            value: value.into(),
            reason: reason.into(),
        };
        Self {
            expected: vec![
                lock("RS_IN", "3.0m", "LM5069 ILIM calculation"),
                lock("R_ILIM", "1.58k", "DRV8873 current limit"),
                lock("R_IPROPI", "1.00k", "DRV8873 IPROPI scaling"),
                lock("R_VBAT_TOP", "140k", "Battery divider calculation"),
                lock("R_VBAT_BOT", "10k", "Battery divider calculation"),
                lock("RS_U", "2.0m", "Motor CSA calculation"),
                lock("RS_V", "2.0m", "Motor CSA calculation"),
                lock("RS_W", "2.0m", "Motor CSA calculation"),
                lock("RFBT", "100k", "LMR33630 3.3V output"),
                lock("RFBB", "43.2k", "LMR33630 3.3V output"),
                lock("C_CPLCPH", "47nF", "DRV8353 charge pump"),
                lock("CDVDT", "33nF", "LM5069 dV/dt control"),
                lock("L4", "10uH", "LMR33630 inductor"),
                lock("RUV_TOP", "140k", "LM5069 UV threshold"),
                lock("RUV_BOT", "10k", "LM5069 UV threshold"),
                lock("ROV_TOP", "221k", "LM5069 OV threshold"),
                lock("ROV_BOT", "10k", "LM5069 OV threshold"),
            ],
            unlocked_severity: Severity::High,
            frozen_board_size: "80x50".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMapRules {
    pub valid_min: u32,
    pub valid_max: u32,
    /// Pins taken by the octal PSRAM interface.
    pub reserved: Vec<u32>,
    pub strapping: Vec<u32>,
    /// Report integer header constants no database pin uses.
    pub report_unused_constants: bool,
}

impl Default for PinMapRules {
    fn default() -> Self {
        Self {
            valid_min: 0,
            valid_max: 48,
            reserved: vec![35, 36, 37],
            strapping: vec![0, 3, 45, 46],
            report_unused_constants: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetLabelRules {
    pub always_required: Vec<String>,
    /// How many unrequired nets are listed before "... and N more".
    pub extra_display_limit: usize,
}

impl Default for NetLabelRules {
    fn default() -> Self {
        Self {
            always_required: strings(&["GND", "MOTOR_PH_U", "MOTOR_PH_V", "MOTOR_PH_W"]),
            extra_display_limit: 10,
        }
    }
}

/// One entry of the banned-content table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BannedPattern {
    pub id: String,
    /// Regex matched against each ASCII-sanitized line.
    pub pattern: String,
    pub case_insensitive: bool,
    pub reason: String,
    pub replacement: Option<String>,
    /// A line that also contains this literal documents the transition.
    pub replacement_marker: Option<String>,
    pub severity: Severity,
    /// Whether safe-context phrases exempt a line.
    pub honor_safe_context: bool,
    /// Whether the global path allow-list applies.
    pub use_allowlist: bool,
    /// Extra path regexes exempt for this pattern only.
    pub allow_paths: Vec<String>,
    /// When non-empty, only paths matching one of these regexes are scanned.
    pub scope_paths: Vec<String>,
    /// Words that, directly before a match, make it a reference to history.
    pub preceded_by_exclusions: Vec<String>,
}

impl Default for BannedPattern {
    fn default() -> Self {
        Self {
            id: String::new(),
            pattern: String::new(),
            case_insensitive: false,
            reason: String::new(),
            replacement: None,
            replacement_marker: None,
            severity: Severity::High,
            honor_safe_context: true,
            use_allowlist: true,
            allow_paths: Vec::new(),
            scope_paths: Vec::new(),
            preceded_by_exclusions: Vec::new(),
        }
    }
}

/// Regulator that must replace the eliminated intermediate rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulatorRule {
    pub reference: String,
    pub part_contains: String,
    pub output_voltage: f64,
}

impl Default for RegulatorRule {
    fn default() -> Self {
        Self {
            reference: "U4".into(),
            part_contains: "LMR33630".into(),
            output_voltage: 3.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BannedRules {
    pub patterns: Vec<BannedPattern>,
    /// Path regexes for historical, archival and report files.
    pub allow_paths: Vec<String>,
    /// Case-insensitive whole-word phrases that mark a historical mention.
    pub safe_phrases: Vec<String>,
    /// Banned component refs containing this marker are descriptive only.
    pub descriptive_ref_marker: String,
    pub regulator: Option<RegulatorRule>,
    pub skip_dirs: Vec<String>,
    pub skip_extensions: Vec<String>,
}

impl Default for BannedRules {
    fn default() -> Self {
        let board_size_exclusions = strings(&["from", "to", "via"]);
        let patterns = vec![
            BannedPattern {
                id: "old-phase-shunt".into(),
                pattern: r"CSS2H-2512R-L200F".into(),
                reason: "Old phase shunt with R suffix (2-3W)".into(),
                replacement: Some("CSS2H-2512K-2L00F".into()),
                replacement_marker: Some("CSS2H-2512K-2L00F".into()),
                severity: Severity::Critical,
                ..Default::default()
            },
            BannedPattern {
                id: "old-input-shunt".into(),
                pattern: r"CSS2H-2728R-L003F".into(),
                reason: "Old RS_IN part, not stocked by distributors".into(),
                replacement: Some("WSLP2728".into()),
                replacement_marker: Some("WSLP2728".into()),
                severity: Severity::Critical,
                ..Default::default()
            },
            BannedPattern {
                id: "old-divider-top".into(),
                pattern: r"\b49\.9\s*k".into(),
                case_insensitive: true,
                reason: "Old battery divider top resistor; frozen value is 140k".into(),
                replacement: Some("140k (ERA-3AEB1403V)".into()),
                severity: Severity::Critical,
                ..Default::default()
            },
            BannedPattern {
                id: "old-divider-bottom".into(),
                pattern: r"\b6\.8\s*k".into(),
                case_insensitive: true,
                reason: "Old battery divider bottom resistor; frozen value is 10k".into(),
                replacement: Some("10k (ERA-3AEB1002V)".into()),
                severity: Severity::Critical,
                ..Default::default()
            },
            BannedPattern {
                id: "old-board-baseline".into(),
                pattern: r"80\s*x\s*60\s*mm".into(),
                reason: "Old baseline board size; frozen size is 80x50mm".into(),
                replacement: Some("80x50mm".into()),
                preceded_by_exclusions: board_size_exclusions,
                ..Default::default()
            },
            BannedPattern {
                id: "old-board-intermediate".into(),
                pattern: r"75\s*x\s*55\s*mm".into(),
                reason: "Old intermediate board size; frozen size is 80x50mm".into(),
                replacement: Some("80x50mm".into()),
                preceded_by_exclusions: strings(&["from", "to", "was", "via"]),
                ..Default::default()
            },
            BannedPattern {
                id: "two-stage-buck".into(),
                pattern: r"24V\s*->\s*5V\s*->\s*3\.3V".into(),
                reason: "Old two-stage buck architecture; the 5V rail is eliminated".into(),
                replacement: Some("24V->3.3V single-stage (LMR33630ADDAR)".into()),
                ..Default::default()
            },
            BannedPattern {
                id: "old-5v-buck".into(),
                pattern: r"TPS62133".into(),
                reason: "Old 5V->3.3V buck, eliminated".into(),
                replacement: Some("LMR33630ADDAR (24V->3.3V direct)".into()),
                severity: Severity::Medium,
                ..Default::default()
            },
            BannedPattern {
                id: "wrong-ldo-family".into(),
                pattern: r"TLV757".into(),
                reason: "Wrong LDO family".into(),
                honor_safe_context: false,
                use_allowlist: false,
                allow_paths: strings(&[r"(^|/)archive/", r"^docs/DOCS_INDEX\.md$"]),
                ..Default::default()
            },
            BannedPattern {
                id: "legacy-interface".into(),
                pattern: r"VESC fallback|PPM|PWM header".into(),
                reason: "Legacy control interface".into(),
                honor_safe_context: false,
                use_allowlist: false,
                scope_paths: strings(&[
                    r"^hardware/",
                    r"^firmware/",
                    r"(^|/)New Single Board Idea\.md$",
                    r"(^|/)Component_Report\.md$",
                ]),
                ..Default::default()
            },
        ];

        Self {
            patterns,
            allow_paths: strings(&[
                r"AI_COLLABORATION\.md$",
                r"(^|/)archive/",
                r"(^|/)reports/",
                r"agent\d+_.*\.txt$",
                r"_REPORT[^/]*\.md$",
                r"_SUMMARY[^/]*\.md$",
                r"FROZEN_STATE_REV_C4b\.md$",
                r"DEVIATIONS_FROM_LEGACY\.md$",
                r"Component_Report\.md$",
                r"(^|/)scripts/.*\.py$",
                r"GITHUB_ISSUES\.md$",
            ]),
            safe_phrases: strings(&[
                "replaces",
                "substitute for",
                "was",
                "old",
                "previous",
                "baseline",
                "optimized from",
                "changed from",
                "originally",
                "not 49.9k",
                "not 6.8k",
                "verify",
                "removed",
                "eliminated",
                "tags",
            ]),
            descriptive_ref_marker: "OLD_".into(),
            regulator: Some(RegulatorRule::default()),
            skip_dirs: strings(&[".git", "target", "node_modules", "__pycache__"]),
            skip_extensions: strings(&[
                "pdf", "jpg", "jpeg", "png", "gif", "pyc", "so", "dll", "exe", "zip",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryRules {
    pub outline_tolerance_mm: f64,
    pub hole_tolerance_mm: f64,
    /// Substring of the footprint library id that marks a mounting hole.
    pub hole_footprint: String,
    pub expected_drill_mm: Option<f64>,
    pub expected_hole_count: Option<usize>,
}

impl Default for GeometryRules {
    fn default() -> Self {
        Self {
            outline_tolerance_mm: OUTLINE_TOLERANCE_MM,
            hole_tolerance_mm: HOLE_TOLERANCE_MM,
            hole_footprint: "MountingHole".into(),
            expected_drill_mm: Some(3.2),
            expected_hole_count: Some(4),
        }
    }
}

/// Firmware symbol for each of the eight ladder boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderSymbols {
    pub fault_low: String,
    pub start_min: String,
    pub start_max: String,
    pub idle_min: String,
    pub idle_max: String,
    pub stop_min: String,
    pub stop_max: String,
    pub fault_high: String,
}

impl Default for LadderSymbols {
    fn default() -> Self {
        Self {
            fault_low: "kLadderFaultLow".into(),
            start_min: "kLadderStartMin".into(),
            start_max: "kLadderStartMax".into(),
            idle_min: "kLadderIdleMin".into(),
            idle_max: "kLadderIdleMax".into(),
            stop_min: "kLadderStopMin".into(),
            stop_max: "kLadderStopMax".into(),
            fault_high: "kLadderFaultHigh".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderRules {
    pub tolerance_v: f64,
    pub symbols: LadderSymbols,
    /// Adjacent boundaries allowed to be equal, by boundary name.
    pub equal_allowed: Vec<(String, String)>,
    /// Adjacent boundaries that must be separated by a positive gap.
    pub required_gaps: Vec<(String, String)>,
    /// Compare the optional documentation table too.
    pub check_docs_table: bool,
}

impl Default for LadderRules {
    fn default() -> Self {
        Self {
            tolerance_v: VOLTAGE_TOLERANCE_V,
            symbols: LadderSymbols::default(),
            equal_allowed: vec![("stop_max".into(), "fault_high".into())],
            required_gaps: vec![
                ("start_max".into(), "idle_min".into()),
                ("idle_max".into(), "stop_min".into()),
            ],
            check_docs_table: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BomRules {
    /// Extra recommended refs per IC, merged with the database lists.
    pub recommended: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsIndexRules {
    pub scan_dirs: Vec<String>,
    pub ignore_extensions: Vec<String>,
    pub ignore_names: Vec<String>,
}

impl Default for DocsIndexRules {
    fn default() -> Self {
        Self {
            scan_dirs: strings(&["docs", "hardware", "firmware", "scripts", "archive"]),
            ignore_extensions: strings(&["pyc", "pyo", "log", "tmp", "bak"]),
            ignore_names: strings(&[".DS_Store", "__pycache__"]),
        }
    }
}
