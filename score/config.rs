use crate::enrich::{GseaOptions, OraAnalysis};
use crate::method::ScoringOptions;
use crate::pathways::DEFAULT_NAME_COLUMN;
use crate::pipeline::AnalysisMethod;
use crate::rank::RankOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file could not be parsed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a run can be configured with. Missing keys take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub method: AnalysisMethod,
    /// Column holding the pathway display name in tabular pathway files.
    pub name_column: Option<String>,
    pub scoring: ScoringOptions,
    pub rank: RankOptions,
    pub ora: OraAnalysis,
    pub gsea: GseaOptions,
}

impl AnalysisConfig {
    pub fn name_column(&self) -> &str {
        self.name_column.as_deref().unwrap_or(DEFAULT_NAME_COLUMN)
    }

    /// Rejects values no engine can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.kernel_pca.n_components == 0 {
            return Err(ConfigError::Invalid(
                "scoring.kernel_pca.n_components must be at least 1".to_string(),
            ));
        }
        if let Some(gamma) = self.scoring.kernel_pca.gamma {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "scoring.kernel_pca.gamma must be positive, got {gamma}"
                )));
            }
        }
        if self.scoring.kmeans.n_init == 0 || self.scoring.kmeans.max_iter == 0 {
            return Err(ConfigError::Invalid(
                "scoring.kmeans.n_init and max_iter must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ora.cutoff) {
            return Err(ConfigError::Invalid(format!(
                "ora.cutoff must lie in [0, 1], got {}",
                self.ora.cutoff
            )));
        }
        if self.gsea.permutations == 0 {
            return Err(ConfigError::Invalid(
                "gsea.permutations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
