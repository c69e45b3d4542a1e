// Configuration loading

pub mod settings;

pub use settings::{EngineSettings, FormulaSettings, OperatorMap, RecalcSettings, SettingsError};
