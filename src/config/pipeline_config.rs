use crate::models::Month;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: InputSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSection {
    /// Folder holding the cleaned monthly exports.
    pub dir: PathBuf,
    /// Folder holding the untouched exports, used only for the file comparison.
    pub raw_dir: Option<PathBuf>,
    /// Monthly files in integration order.
    pub sources: Vec<MonthlySource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySource {
    pub file: String,
    pub month: Month,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    pub dir: PathBuf,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_qa_summary")]
    pub qa_summary: String,
    #[serde(default = "default_quality_html")]
    pub quality_html: String,
}

fn default_dataset() -> String {
    "dataset_finale_ETL_QA".to_string()
}

fn default_qa_summary() -> String {
    "QA_summary.csv".to_string()
}

fn default_quality_html() -> String {
    "data_quality_report.html".to_string()
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Load the config file when it exists, otherwise fall back to the built-in
    /// business defaults.
    pub fn from_file_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.sources.is_empty() {
            return Err(anyhow!("Pipeline config lists no monthly sources"));
        }

        let mut seen = HashSet::new();
        for source in &self.input.sources {
            if source.file.trim().is_empty() {
                return Err(anyhow!("Monthly source for {} has an empty file name", source.month));
            }
            if !seen.insert(source.file.as_str()) {
                return Err(anyhow!("Monthly source listed twice: {}", source.file));
            }
        }

        if self.output.dataset.trim().is_empty() {
            return Err(anyhow!("Output dataset name cannot be empty"));
        }

        Ok(())
    }

    /// Resolved paths of every monthly file, paired with its month label.
    pub fn source_paths(&self) -> Vec<(PathBuf, Month)> {
        self.input
            .sources
            .iter()
            .map(|source| (self.input.dir.join(&source.file), source.month))
            .collect()
    }

    pub fn dataset_parquet(&self) -> PathBuf {
        self.output.dir.join(format!("{}.parquet", self.output.dataset))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let sources = [
            ("cleaned_dataG.xlsx", Month::Gennaio),
            ("cleaned_dataF.xlsx", Month::Febbraio),
            ("Copia di cleaned_dataA.xlsx", Month::Aprile),
            ("cleaned_dataM.xlsx", Month::Maggio),
            ("cleaned_dataGIU.xlsx", Month::Giugno),
            ("cleaned_dataL.xlsx", Month::Luglio),
            ("cleaned_dataAGO.xlsx", Month::Agosto),
        ]
        .into_iter()
        .map(|(file, month)| MonthlySource {
            file: file.to_string(),
            month,
        })
        .collect();

        PipelineConfig {
            input: InputSection {
                dir: PathBuf::from("dati_puliti"),
                raw_dir: Some(PathBuf::from("dati_originali")),
                sources,
            },
            output: OutputSection {
                dir: PathBuf::from("ETL_QA"),
                dataset: default_dataset(),
                qa_summary: default_qa_summary(),
                quality_html: default_quality_html(),
            },
        }
    }
}
