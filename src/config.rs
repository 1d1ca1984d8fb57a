// ==============================================================================
// config.rs - Pipeline Configuration
// ==============================================================================
// Description: Explicit configuration handed to each stage's constructor
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cohort::CohortRange;

pub const DEFAULT_CHUNK_SIZE: usize = 500_000;
pub const DEFAULT_SOURCE_TABLE: &str = "SNP_Indv_Sanos/snp_individuals_data_2.csv";
pub const DEFAULT_OUTPUT_PREFIX: &str = "SNP_Indv_Sanos/individual_csv_files";
pub const DEFAULT_CHECKPOINT: &str = "SNP_Indv_Sanos/checkpoints/checkpoint_filtered_lote2.json";
pub const DEFAULT_POPULATION_TABLE: &str = "igsr_Iberian_populations_in_Spain.csv";
pub const DEFAULT_SAMPLE_COLUMN: &str = "Sample";
pub const DEFAULT_VCF_PREFIX: &str = "vcf_files/";
pub const DEFAULT_WORK_DIR: &str = "/tmp";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("{name} must not be empty")]
    EmptyPath { name: &'static str },

    #[error("{name} '{path}' has no file name")]
    NoFileName { name: &'static str, path: String },
}

/// Settings for the per-individual splitting run
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Wide source table in object storage
    pub source_table: String,

    /// Prefix under which per-individual artifacts are written
    pub output_prefix: String,

    /// Checkpoint record in object storage
    pub checkpoint: String,

    /// Local directory for staged copies
    pub work_dir: PathBuf,

    /// Rows per chunk
    pub chunk_size: usize,
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.output_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::EmptyPath { name: "output prefix" });
        }
        file_name_of("source table", &self.source_table)?;
        file_name_of("checkpoint", &self.checkpoint)?;
        Ok(())
    }

    /// Local staging path of the source table
    pub fn local_source_table(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.work_dir.join(file_name_of("source table", &self.source_table)?))
    }

    /// Local staging path of the checkpoint
    pub fn local_checkpoint(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.work_dir.join(file_name_of("checkpoint", &self.checkpoint)?))
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            source_table: DEFAULT_SOURCE_TABLE.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            checkpoint: DEFAULT_CHECKPOINT.to_string(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Variant query backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBackend {
    /// External `bcftools` binary
    Bcftools { binary: PathBuf },
    /// In-process gzip VCF reader
    Gzip,
}

/// Settings for the VCF extraction run
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Population table in object storage (CSV with a sample column)
    pub population_table: String,

    /// Column of the population table holding sample identifiers
    pub sample_column: String,

    /// Local file listing already processed individuals to exclude
    pub exclusion_list: Option<PathBuf>,

    /// Object prefix holding the `.vcf.gz` shards
    pub vcf_prefix: String,

    /// Wide table written for the splitting stage
    pub output_table: String,

    /// Local directory for staged copies
    pub work_dir: PathBuf,

    /// Inclusive 1-based cohort selection
    pub range: CohortRange,

    pub backend: QueryBackend,
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_column.is_empty() {
            return Err(ConfigError::EmptyPath { name: "sample column" });
        }
        file_name_of("population table", &self.population_table)?;
        file_name_of("output table", &self.output_table)?;
        Ok(())
    }

    pub fn local_population_table(&self) -> Result<PathBuf, ConfigError> {
        Ok(self
            .work_dir
            .join(file_name_of("population table", &self.population_table)?))
    }

    pub fn local_output_table(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.work_dir.join(file_name_of("output table", &self.output_table)?))
    }

    /// Local staging path for a shard object
    pub fn local_shard(&self, shard: &str) -> Result<PathBuf, ConfigError> {
        Ok(self.work_dir.join(file_name_of("VCF shard", shard)?))
    }
}

/// Last segment of an object path
fn file_name_of<'a>(name: &'static str, object: &'a str) -> Result<&'a str, ConfigError> {
    if object.is_empty() {
        return Err(ConfigError::EmptyPath { name });
    }
    Path::new(object)
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| ConfigError::NoFileName {
            name,
            path: object.to_string(),
        })
}
