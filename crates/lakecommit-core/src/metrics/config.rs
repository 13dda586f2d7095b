use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::metrics::{InvalidModeSnafu, MetricsError, MetricsResult};

/// Table property: metrics mode for columns without an override.
pub const DEFAULT_WRITE_METRICS_MODE: &str = "write.metadata.metrics.default";
/// Table property prefix for per-column overrides
/// (`write.metadata.metrics.column.<name>`).
pub const METRICS_MODE_COLUMN_PREFIX: &str = "write.metadata.metrics.column.";
/// Default truncation length for bounds.
pub const DEFAULT_TRUNCATE_LENGTH: usize = 16;

/// How much statistics to keep for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsMode {
    /// Column size only.
    None,
    /// Column size, value count, and null count.
    Counts,
    /// Counts plus bounds; string and binary bounds truncated to the length.
    Truncate(usize),
    /// Counts plus untruncated bounds.
    Full,
}

impl Default for MetricsMode {
    fn default() -> Self {
        MetricsMode::Truncate(DEFAULT_TRUNCATE_LENGTH)
    }
}

impl MetricsMode {
    /// Whether value and null counts are recorded.
    pub fn keeps_counts(self) -> bool {
        !matches!(self, MetricsMode::None)
    }

    /// Whether lower and upper bounds are recorded.
    pub fn keeps_bounds(self) -> bool {
        matches!(self, MetricsMode::Truncate(_) | MetricsMode::Full)
    }
}

impl FromStr for MetricsMode {
    type Err = MetricsError;

    /// Parses `none`, `counts`, `full`, or `truncate(<n>)` with `n > 0`,
    /// ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "none" => return Ok(MetricsMode::None),
            "counts" => return Ok(MetricsMode::Counts),
            "full" => return Ok(MetricsMode::Full),
            _ => {}
        }

        let length = normalized
            .strip_prefix("truncate(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|n| n.trim().parse::<usize>().ok())
            .filter(|n| *n > 0);

        match length {
            Some(n) => Ok(MetricsMode::Truncate(n)),
            None => InvalidModeSnafu { value: s }.fail(),
        }
    }
}

impl fmt::Display for MetricsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsMode::None => f.write_str("none"),
            MetricsMode::Counts => f.write_str("counts"),
            MetricsMode::Truncate(n) => write!(f, "truncate({n})"),
            MetricsMode::Full => f.write_str("full"),
        }
    }
}

/// Per-column metrics policy of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    default_mode: MetricsMode,
    column_modes: BTreeMap<String, MetricsMode>,
}

impl MetricsConfig {
    /// A config that applies `mode` to every column.
    pub fn with_default(mode: MetricsMode) -> Self {
        Self {
            default_mode: mode,
            column_modes: BTreeMap::new(),
        }
    }

    /// Read the policy from table properties. Any invalid mode string is an
    /// error.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> MetricsResult<Self> {
        let default_mode = match properties.get(DEFAULT_WRITE_METRICS_MODE) {
            Some(raw) => raw.parse()?,
            None => MetricsMode::default(),
        };

        let mut column_modes = BTreeMap::new();
        for (key, raw) in properties {
            if let Some(column) = key.strip_prefix(METRICS_MODE_COLUMN_PREFIX) {
                column_modes.insert(column.to_string(), raw.parse()?);
            }
        }

        Ok(Self {
            default_mode,
            column_modes,
        })
    }

    /// Mode used for columns without an override.
    pub fn default_mode(&self) -> MetricsMode {
        self.default_mode
    }

    /// Mode for the column called `name`.
    pub fn mode_for(&self, name: &str) -> MetricsMode {
        self.column_modes
            .get(name)
            .copied()
            .unwrap_or(self.default_mode)
    }
}
