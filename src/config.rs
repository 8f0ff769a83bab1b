//! Aggregator configuration structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{LinkStatsError, Result};

/// Attribute carrying the event time when none is configured
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

/// Separator between segments of the field path
pub const FIELD_PATH_SEPARATOR: &str = "->";

/// Raw plugin options as they appear in a pipeline config document.
///
/// Every option is optional at this level; [`Settings::from_config`] decides
/// which omissions are fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkStatsConfig {
    /// Grouping dimensions and measured field, joined by `->`
    #[serde(alias = "fieldsLink")]
    pub fields_link: Option<String>,

    /// Attribute holding the event time
    pub timestamp: Option<String>,

    /// Suppress passthrough of the raw event
    pub drop_original_event: bool,

    /// Bucket width and rotation period, in seconds
    #[serde(alias = "batchWindow")]
    pub batch_window: Option<u64>,

    /// Maximum accepted event age and cumulative bucket lifetime, in seconds
    #[serde(alias = "reserveWindow")]
    pub reserve_window: Option<u64>,

    /// `cumulative` or `separate`
    #[serde(alias = "accumulatateMode", alias = "accumulateMode")]
    pub accumulate_mode: Option<String>,

    /// Emission delay in whole windows
    #[serde(alias = "windowOffset")]
    pub window_offset: Option<u64>,
}

impl LinkStatsConfig {
    /// Create a new config builder
    pub fn builder() -> LinkStatsConfigBuilder {
        LinkStatsConfigBuilder::new()
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}

/// Builder for LinkStatsConfig
#[derive(Debug, Default)]
pub struct LinkStatsConfigBuilder {
    config: LinkStatsConfig,
}

impl LinkStatsConfigBuilder {
    /// Create a new builder with nothing set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field path, e.g. `"host->path->latency"`
    pub fn fields_link(mut self, path: impl Into<String>) -> Self {
        self.config.fields_link = Some(path.into());
        self
    }

    /// Set the timestamp attribute
    pub fn timestamp(mut self, field: impl Into<String>) -> Self {
        self.config.timestamp = Some(field.into());
        self
    }

    /// Suppress passthrough of original events
    pub fn drop_original_event(mut self, drop: bool) -> Self {
        self.config.drop_original_event = drop;
        self
    }

    /// Set the window width in seconds
    pub fn batch_window(mut self, seconds: u64) -> Self {
        self.config.batch_window = Some(seconds);
        self
    }

    /// Set the retention horizon in seconds
    pub fn reserve_window(mut self, seconds: u64) -> Self {
        self.config.reserve_window = Some(seconds);
        self
    }

    /// Set the accumulation mode by name
    pub fn accumulate_mode(mut self, mode: impl Into<String>) -> Self {
        self.config.accumulate_mode = Some(mode.into());
        self
    }

    /// Set the emission delay in windows
    pub fn window_offset(mut self, windows: u64) -> Self {
        self.config.window_offset = Some(windows);
        self
    }

    /// Build the raw configuration
    pub fn build(self) -> LinkStatsConfig {
        self.config
    }
}

/// Bucket retirement policy applied on every rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationMode {
    /// Buckets survive rotation until they fall out of the retention horizon
    #[default]
    Cumulative,
    /// Every rotation wipes the whole bucket store
    Separate,
}

impl AccumulationMode {
    /// Resolve a configured mode name, falling back to cumulative
    pub fn from_option(name: Option<&str>) -> Self {
        match name {
            None | Some("cumulative") => AccumulationMode::Cumulative,
            Some("separate") => AccumulationMode::Separate,
            Some(other) => {
                warn!(
                    "invalid accumulatateMode: {}. set to cumulative",
                    other
                );
                AccumulationMode::Cumulative
            }
        }
    }
}

impl fmt::Display for AccumulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationMode::Cumulative => write!(f, "cumulative"),
            AccumulationMode::Separate => write!(f, "separate"),
        }
    }
}

/// Grouping dimensions followed by the measured field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    fields: Vec<String>,
}

impl FieldPath {
    /// Split a `->` separated path; needs at least two non-empty segments
    pub fn parse(path: &str) -> Result<Self> {
        let fields: Vec<String> = path
            .split(FIELD_PATH_SEPARATOR)
            .map(|segment| segment.trim().to_string())
            .collect();

        if fields.len() < 2 || fields.iter().any(|f| f.is_empty()) {
            return Err(LinkStatsError::InvalidFieldPath(path.to_string()));
        }

        Ok(Self { fields })
    }

    /// All segments in order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Grouping dimensions: every segment but the last
    pub fn dimensions(&self) -> &[String] {
        &self.fields[..self.fields.len() - 1]
    }

    /// The measured field: the last segment
    pub fn measured(&self) -> &str {
        &self.fields[self.fields.len() - 1]
    }

    /// Number of segments, always at least two
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields.join(FIELD_PATH_SEPARATOR))
    }
}

/// Validated runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Grouping hierarchy and measured field
    pub field_path: FieldPath,
    /// Attribute holding the event time
    pub timestamp_field: String,
    /// Suppress passthrough of the raw event
    pub drop_original_event: bool,
    /// Window width in seconds, always positive
    pub batch_window: i64,
    /// Retention horizon in seconds
    pub reserve_window: i64,
    /// Bucket retirement policy
    pub mode: AccumulationMode,
    /// Emission delay in whole windows
    pub window_offset: i64,
}

impl Settings {
    /// Validate a raw configuration.
    ///
    /// Missing field path, window width or retention horizon is fatal, as is a
    /// zero window width. An unknown accumulation mode only logs a warning.
    pub fn from_config(config: &LinkStatsConfig) -> Result<Self> {
        let fields_link = config
            .fields_link
            .as_deref()
            .ok_or(LinkStatsError::MissingOption("fieldsLink"))?;
        let field_path = FieldPath::parse(fields_link)?;

        let batch_window = config
            .batch_window
            .ok_or(LinkStatsError::MissingOption("batchWindow"))?;
        if batch_window == 0 {
            return Err(LinkStatsError::Configuration(
                "batchWindow must be greater than 0".to_string(),
            ));
        }
        let reserve_window = config
            .reserve_window
            .ok_or(LinkStatsError::MissingOption("reserveWindow"))?;

        Ok(Self {
            field_path,
            timestamp_field: config
                .timestamp
                .clone()
                .unwrap_or_else(|| DEFAULT_TIMESTAMP_FIELD.to_string()),
            drop_original_event: config.drop_original_event,
            batch_window: seconds("batchWindow", batch_window)?,
            reserve_window: seconds("reserveWindow", reserve_window)?,
            mode: AccumulationMode::from_option(config.accumulate_mode.as_deref()),
            window_offset: seconds("windowOffset", config.window_offset.unwrap_or(0))?,
        })
    }

    /// Rotation period
    pub fn rotation_period(&self) -> Duration {
        Duration::from_secs(self.batch_window.unsigned_abs())
    }
}

impl TryFrom<&LinkStatsConfig> for Settings {
    type Error = LinkStatsError;

    fn try_from(config: &LinkStatsConfig) -> Result<Self> {
        Settings::from_config(config)
    }
}

fn seconds(option: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| LinkStatsError::Configuration(format!("{} is out of range: {}", option, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LinkStatsConfigBuilder {
        LinkStatsConfig::builder()
            .fields_link("host->path->latency")
            .batch_window(10)
            .reserve_window(60)
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_config(&base().build()).unwrap();
        assert_eq!(settings.timestamp_field, "@timestamp");
        assert!(!settings.drop_original_event);
        assert_eq!(settings.mode, AccumulationMode::Cumulative);
        assert_eq!(settings.window_offset, 0);
        assert_eq!(settings.rotation_period(), Duration::from_secs(10));
    }

    #[test]
    fn test_field_path_split() {
        let path = FieldPath::parse("host -> path->latency").unwrap();
        assert_eq!(path.dimensions(), &["host".to_string(), "path".to_string()]);
        assert_eq!(path.measured(), "latency");
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_string(), "host->path->latency");
    }

    #[test]
    fn test_field_path_requires_two_segments() {
        assert!(matches!(
            FieldPath::parse("latency"),
            Err(LinkStatsError::InvalidFieldPath(_))
        ));
        assert!(FieldPath::parse("host->").is_err());
        assert!(FieldPath::parse("->latency").is_err());
    }

    #[test]
    fn test_missing_required_options() {
        let no_path = LinkStatsConfig::builder().batch_window(10).reserve_window(60).build();
        assert!(matches!(
            Settings::from_config(&no_path),
            Err(LinkStatsError::MissingOption("fieldsLink"))
        ));

        let no_window = LinkStatsConfig::builder().fields_link("a->b").reserve_window(60).build();
        assert!(matches!(
            Settings::from_config(&no_window),
            Err(LinkStatsError::MissingOption("batchWindow"))
        ));

        let no_reserve = LinkStatsConfig::builder().fields_link("a->b").batch_window(10).build();
        assert!(matches!(
            Settings::from_config(&no_reserve),
            Err(LinkStatsError::MissingOption("reserveWindow"))
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = base().batch_window(0).build();
        assert!(matches!(
            Settings::from_config(&config),
            Err(LinkStatsError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_mode_falls_back() {
        let settings = Settings::from_config(&base().accumulate_mode("rolling").build()).unwrap();
        assert_eq!(settings.mode, AccumulationMode::Cumulative);

        let settings = Settings::from_config(&base().accumulate_mode("separate").build()).unwrap();
        assert_eq!(settings.mode, AccumulationMode::Separate);
    }

    #[test]
    fn test_yaml_with_plugin_keys() {
        let yaml = r#"
fieldsLink: "host->latency"
timestamp: "ts"
drop_original_event: true
batchWindow: 30
reserveWindow: 300
accumulatateMode: separate
windowOffset: 2
"#;
        let config = LinkStatsConfig::from_yaml_str(yaml).unwrap();
        let settings = Settings::try_from(&config).unwrap();
        assert_eq!(settings.field_path.measured(), "latency");
        assert_eq!(settings.timestamp_field, "ts");
        assert!(settings.drop_original_event);
        assert_eq!(settings.batch_window, 30);
        assert_eq!(settings.reserve_window, 300);
        assert_eq!(settings.mode, AccumulationMode::Separate);
        assert_eq!(settings.window_offset, 2);
    }

    #[test]
    fn test_yaml_with_snake_case_keys() {
        let yaml = "fields_link: a->b\nbatch_window: 5\nreserve_window: 50\n";
        let config = LinkStatsConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config, base().fields_link("a->b").batch_window(5).reserve_window(50).build());
    }

    #[test]
    fn test_negative_window_is_a_parse_error() {
        let yaml = "fieldsLink: a->b\nbatchWindow: -5\nreserveWindow: 50\n";
        assert!(matches!(
            LinkStatsConfig::from_yaml_str(yaml),
            Err(LinkStatsError::YamlParse(_))
        ));
    }
}
