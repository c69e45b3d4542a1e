// Engine settings
// Loaded from ~/.config/cellgraph/settings.json (or an explicit .json / .toml path)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors raised while reading, parsing or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("settings parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("settings serialize error: {0}")]
    Serialize(String),
    #[error("settings validation error: {0}")]
    Validation(String),
}

/// Maps binary-expression operators onto function names.
///
/// The names are looked up in the default namespace, so `=1+2` invokes
/// `sys.ADD` with `[1, 2]` unless overridden here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorMap {
    pub add: String,
    pub subtract: String,
    pub multiply: String,
    pub divide: String,
    pub power: String,
    pub concat: String,
    pub eq: String,
    pub ne: String,
    pub lt: String,
    pub gt: String,
    pub lte: String,
    pub gte: String,
}

impl Default for OperatorMap {
    fn default() -> Self {
        Self {
            add: "ADD".to_string(),
            subtract: "SUBTRACT".to_string(),
            multiply: "MULTIPLY".to_string(),
            divide: "DIVIDE".to_string(),
            power: "POWER".to_string(),
            concat: "CONCAT".to_string(),
            eq: "EQ".to_string(),
            ne: "NE".to_string(),
            lt: "LT".to_string(),
            gt: "GT".to_string(),
            lte: "LTE".to_string(),
            gte: "GTE".to_string(),
        }
    }
}

impl OperatorMap {
    /// Function name for an operator symbol (`+`, `<>`, `&`, ...).
    pub fn get(&self, symbol: &str) -> Option<&str> {
        let name = match symbol {
            "+" => &self.add,
            "-" => &self.subtract,
            "*" => &self.multiply,
            "/" => &self.divide,
            "^" => &self.power,
            "&" => &self.concat,
            "=" => &self.eq,
            "<>" => &self.ne,
            "<" => &self.lt,
            ">" => &self.gt,
            "<=" => &self.lte,
            ">=" => &self.gte,
            _ => return None,
        };
        if name.is_empty() {
            None
        } else {
            Some(name.as_str())
        }
    }

    fn entries(&self) -> [(&'static str, &str); 12] {
        [
            ("+", &self.add),
            ("-", &self.subtract),
            ("*", &self.multiply),
            ("/", &self.divide),
            ("^", &self.power),
            ("&", &self.concat),
            ("=", &self.eq),
            ("<>", &self.ne),
            ("<", &self.lt),
            (">", &self.gt),
            ("<=", &self.lte),
            (">=", &self.gte),
        ]
    }
}

/// Formula parsing and evaluation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormulaSettings {
    /// Namespace used for function calls written without one (`=SUM(..)`)
    pub default_namespace: String,

    /// Operator → function name mapping for binary expressions
    pub operators: OperatorMap,
}

impl Default for FormulaSettings {
    fn default() -> Self {
        Self {
            default_namespace: "sys".to_string(),
            operators: OperatorMap::default(),
        }
    }
}

/// Batch recalculation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecalcSettings {
    /// Batches slower than this are logged at warn level (None = never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_batch_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub formula: FormulaSettings,
    pub recalc: RecalcSettings,
}

impl EngineSettings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cellgraph");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults.
    ///
    /// A missing file is not an error. An unreadable or invalid file is
    /// logged and ignored.
    pub fn load() -> Self {
        Self::load_or_default(&Self::config_path())
    }

    /// `load_from`, with a missing or invalid file giving the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Error loading {}: {}; using default settings", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load and validate settings from an explicit path.
    ///
    /// `.toml` files are parsed as TOML, everything else as JSON with
    /// `//` line comments allowed.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&contents)
        } else {
            Self::from_json_str(&contents)
        }
    }

    pub fn from_json_str(contents: &str) -> Result<Self, SettingsError> {
        // Strip comments (lines starting with //)
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let settings: Self = serde_json::from_str(&cleaned)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SettingsError::Serialize(e.to_string()))?;
        fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let ns = &self.formula.default_namespace;
        if ns.is_empty() {
            return Err(SettingsError::Validation(
                "formula.defaultNamespace must not be empty".to_string(),
            ));
        }
        if !ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SettingsError::Validation(format!(
                "formula.defaultNamespace '{ns}' may only contain letters, digits and '_'"
            )));
        }
        for (symbol, name) in self.formula.operators.entries() {
            if name.chars().any(|c| c.is_whitespace()) {
                return Err(SettingsError::Validation(format!(
                    "operator '{symbol}' maps to invalid function name '{name}'"
                )));
            }
        }
        Ok(())
    }
}
