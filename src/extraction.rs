// ==============================================================================
// extraction.rs - VCF Extraction Stage
// ==============================================================================
// Description: Builds the wide genotype table for a selected cohort from VCF shards
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Output: CHROM,POS,ID,REF,ALT,<sample>...
//   The sample columns are the requested samples found in at least one shard,
//   in request order. A shard lacking one of them leaves that cell empty.
// ==============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use csv::Writer;
use tracing::{debug, info, warn};

use crate::checkpoint::remove_staged_file;
use crate::cohort::{candidate_individuals, load_exclusions, read_population};
use crate::config::ExtractConfig;
use crate::models::METADATA_COLUMNS;
use crate::storage::SharedStore;
use crate::variant_query::VariantQuery;

/// Shard staged locally with the requested samples it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    pub object: String,
    pub local: PathBuf,
    pub samples: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ExtractionSummary {
    pub shards_total: usize,
    pub shards_processed: usize,
    pub shards_skipped: usize,
    pub records_written: u64,
    pub records_skipped: u64,
    /// Sample columns of the written table
    pub samples: Vec<String>,
    /// Requested samples absent from every shard
    pub missing_samples: Vec<String>,
}

/// Extraction stage over one object store and one query backend
pub struct Extractor<Q: VariantQuery> {
    store: SharedStore,
    query: Q,
    config: ExtractConfig,
}

impl<Q: VariantQuery> Extractor<Q> {
    pub fn new(store: SharedStore, query: Q, config: ExtractConfig) -> Self {
        Self {
            store,
            query,
            config,
        }
    }

    /// Run the stage: select cohort, stage shards, write and upload the table
    pub fn run(&self) -> Result<ExtractionSummary> {
        self.config.validate()?;

        let selected = self.select_cohort()?;
        info!("Selected {} individuals: {:?}", selected.len(), selected);

        let shards = self.stage_shards()?;
        let mut summary = ExtractionSummary {
            shards_total: shards.len(),
            ..Default::default()
        };

        let plans = self.plan_shards(shards, &selected, &mut summary);
        summary.samples = header_samples(&selected, &plans);
        summary.missing_samples = selected
            .iter()
            .filter(|s| !summary.samples.contains(s))
            .cloned()
            .collect();
        if !summary.missing_samples.is_empty() {
            warn!(
                "{} requested samples are not present in any shard: {:?}",
                summary.missing_samples.len(),
                summary.missing_samples
            );
        }

        let local_output = self.config.local_output_table()?;
        self.write_table(&local_output, &plans, &mut summary)?;

        info!("Uploading {:?} as {}", local_output, self.config.output_table);
        self.store
            .upload(&local_output, &self.config.output_table)
            .with_context(|| format!("Failed to upload {}", self.config.output_table))?;

        remove_staged_file(&local_output);
        remove_staged_file(&self.config.local_population_table()?);

        info!(
            "Extraction complete: {} records from {}/{} shards ({} shards skipped, {} lines skipped)",
            summary.records_written,
            summary.shards_processed,
            summary.shards_total,
            summary.shards_skipped,
            summary.records_skipped
        );
        Ok(summary)
    }

    /// Candidate individuals narrowed to the configured range
    pub fn select_cohort(&self) -> Result<Vec<String>> {
        let population = &self.config.population_table;
        if !self.store.exists(population)? {
            anyhow::bail!("Population table {} does not exist", population);
        }

        let local = self.config.local_population_table()?;
        self.store
            .download(population, &local)
            .with_context(|| format!("Failed to download {}", population))?;

        let file = std::fs::File::open(&local)
            .with_context(|| format!("Failed to open {:?}", local))?;
        let samples = read_population(file, &self.config.sample_column)
            .with_context(|| format!("Failed to read population table {}", population))?;

        let excluded = match &self.config.exclusion_list {
            Some(path) => load_exclusions(path)
                .with_context(|| format!("Failed to read exclusion list {:?}", path))?,
            None => Default::default(),
        };
        debug!("{} individuals excluded", excluded.len());

        let candidates = candidate_individuals(samples, &excluded);
        let selected = self
            .config
            .range
            .select(&candidates)
            .context("Invalid cohort selection")?;

        Ok(selected.to_vec())
    }

    /// List `.vcf.gz` shards under the prefix and stage each one locally
    pub fn stage_shards(&self) -> Result<Vec<(String, PathBuf)>> {
        let objects = self
            .store
            .list(&self.config.vcf_prefix)
            .with_context(|| format!("Failed to list {}", self.config.vcf_prefix))?;

        let mut staged = Vec::new();
        for object in objects.into_iter().filter(|o| o.ends_with(".vcf.gz")) {
            let local = self.config.local_shard(&object)?;
            if local.exists() {
                info!("{:?} already staged, skipping download", local);
            } else {
                info!("Downloading VCF shard {}", object);
                self.store
                    .download(&object, &local)
                    .with_context(|| format!("Failed to download {}", object))?;
            }
            staged.push((object, local));
        }

        info!("{} VCF shards staged", staged.len());
        Ok(staged)
    }

    /// Intersect each shard's samples with the request, skipping unusable shards
    fn plan_shards(
        &self,
        shards: Vec<(String, PathBuf)>,
        selected: &[String],
        summary: &mut ExtractionSummary,
    ) -> Vec<ShardPlan> {
        let mut plans = Vec::new();

        for (object, local) in shards {
            let available = match self.query.list_samples(&local) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Failed to list samples of {}, skipping shard: {}", object, e);
                    summary.shards_skipped += 1;
                    continue;
                }
            };

            let samples: Vec<String> = selected
                .iter()
                .filter(|s| available.contains(s))
                .cloned()
                .collect();

            if samples.is_empty() {
                warn!("No requested samples in {}, skipping shard", object);
                summary.shards_skipped += 1;
                continue;
            }

            debug!("{}: {} of {} requested samples", object, samples.len(), selected.len());
            plans.push(ShardPlan {
                object,
                local,
                samples,
            });
        }

        plans
    }

    /// Stream every planned shard into one wide CSV, record by record
    fn write_table(
        &self,
        path: &std::path::Path,
        plans: &[ShardPlan],
        summary: &mut ExtractionSummary,
    ) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("Failed to create {:?}", path))?;

        let header: Vec<&str> = METADATA_COLUMNS
            .iter()
            .copied()
            .chain(summary.samples.iter().map(String::as_str))
            .collect();
        writer.write_record(&header)?;

        for plan in plans {
            info!("Processing SNPs in {}", plan.object);

            // Header column -> field index within this shard's record lines
            let columns: Vec<Option<usize>> = summary
                .samples
                .iter()
                .map(|s| {
                    plan.samples
                        .iter()
                        .position(|p| p == s)
                        .map(|i| i + METADATA_COLUMNS.len())
                })
                .collect();
            let expected_fields = METADATA_COLUMNS.len() + plan.samples.len();

            let records = match self.query.stream_records(&plan.local, &plan.samples) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Failed to query {}, skipping shard: {}", plan.object, e);
                    summary.shards_skipped += 1;
                    continue;
                }
            };

            let mut written = 0u64;
            let mut failed = false;
            for line in records {
                // Rows already written for this shard are kept
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(
                            "Record stream of {} failed after {} records, skipping rest of shard: {}",
                            plan.object, written, e
                        );
                        failed = true;
                        break;
                    }
                };
                let fields: Vec<&str> = line.split('\t').collect();

                if fields.len() != expected_fields {
                    warn!(
                        "Skipping record in {}: expected {} fields, found {}",
                        plan.object,
                        expected_fields,
                        fields.len()
                    );
                    summary.records_skipped += 1;
                    continue;
                }

                let row = fields[..METADATA_COLUMNS.len()]
                    .iter()
                    .copied()
                    .chain(columns.iter().map(|c| c.map_or("", |i| fields[i])));
                writer.write_record(row)?;
                written += 1;
            }

            summary.records_written += written;
            if failed {
                summary.shards_skipped += 1;
            } else {
                info!("{}: {} records written", plan.object, written);
                summary.shards_processed += 1;
            }
        }

        writer.flush()?;
        Ok(())
    }
}

/// Requested samples present in at least one plan, in request order
fn header_samples(selected: &[String], plans: &[ShardPlan]) -> Vec<String> {
    selected
        .iter()
        .filter(|s| plans.iter().any(|p| p.samples.contains(s)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::CohortRange;
    use crate::config::QueryBackend;
    use crate::storage::{LocalObjectStore, ObjectStore};
    use crate::variant_query::tests::{write_gz, VCF};
    use crate::variant_query::{GzipVcfQuery, QueryError, RecordLines};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const SECOND_SHARD: &str = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tHG02\tHG09
X\t500\trs5\tT\tC\t.\tPASS\t.\tGT\t1|1\t0|0
";

    struct Fixture {
        _bucket: TempDir,
        work: TempDir,
        store: Arc<LocalObjectStore>,
    }

    fn fixture() -> Fixture {
        let bucket = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = Arc::new(LocalObjectStore::new(bucket.path()));

        store
            .write_text(
                "igsr_Iberian_populations_in_Spain.csv",
                "Sample,Sex\nHG03,f\nHG01,m\nHG02,f\nHG01,m\nHG07,m\nHG04,f\n",
            )
            .unwrap();

        let shard_dir = bucket.path().join("vcf_files");
        std::fs::create_dir_all(&shard_dir).unwrap();
        write_gz(&shard_dir.join("chr1.vcf.gz"), VCF);
        write_gz(&shard_dir.join("chrX.vcf.gz"), SECOND_SHARD);
        store.write_text("vcf_files/README.txt", "not a shard").unwrap();

        Fixture {
            _bucket: bucket,
            work,
            store,
        }
    }

    fn config(work: &Path, range: CohortRange, exclusion_list: Option<PathBuf>) -> ExtractConfig {
        ExtractConfig {
            population_table: "igsr_Iberian_populations_in_Spain.csv".to_string(),
            sample_column: "Sample".to_string(),
            exclusion_list,
            vcf_prefix: "vcf_files/".to_string(),
            output_table: "SNP_Indv_Sanos/snp_individuals_data_2.csv".to_string(),
            work_dir: work.to_path_buf(),
            range,
            backend: QueryBackend::Gzip,
        }
    }

    #[test]
    fn test_extract_wide_table() {
        let fx = fixture();
        let exclusions = fx.work.path().join("lista_archivos.txt");
        std::fs::write(&exclusions, "SNP_Indv_Sanos/individual_csv_files/HG07.csv\n").unwrap();

        // Candidates after exclusion + dedup: HG03, HG01, HG02, HG04
        let extractor = Extractor::new(
            fx.store.clone(),
            GzipVcfQuery::new(),
            config(fx.work.path(), CohortRange::new(1, 4), Some(exclusions)),
        );
        let summary = extractor.run().unwrap();

        assert_eq!(summary.shards_total, 2);
        assert_eq!(summary.shards_processed, 2);
        assert_eq!(summary.records_written, 4);
        assert_eq!(summary.samples, vec!["HG03", "HG01", "HG02"]);
        assert_eq!(summary.missing_samples, vec!["HG04"]);

        let table = fx
            .store
            .read_text("SNP_Indv_Sanos/snp_individuals_data_2.csv")
            .unwrap();
        assert_eq!(
            table,
            "\
CHROM,POS,ID,REF,ALT,HG03,HG01,HG02
1,100,rs1,A,G,1|1,0|0,0|1
1,200,rs2,C,T,0|1,1|1,0|0
chr2,300,.,G,A,.,.,.
X,500,rs5,T,C,,,1|1
"
        );

        // Staged copies of outputs are cleaned up, shards stay for reuse
        assert!(!fx.work.path().join("snp_individuals_data_2.csv").exists());
        assert!(fx.work.path().join("chr1.vcf.gz").exists());
    }

    #[test]
    fn test_invalid_range_aborts_before_staging() {
        let fx = fixture();
        let extractor = Extractor::new(
            fx.store.clone(),
            GzipVcfQuery::new(),
            config(fx.work.path(), CohortRange::new(3, 99), None),
        );

        assert!(extractor.run().is_err());
        assert!(!fx.work.path().join("chr1.vcf.gz").exists());
        assert!(!fx.store.exists("SNP_Indv_Sanos/snp_individuals_data_2.csv").unwrap());
    }

    /// Query backend whose sample listing fails for one shard
    struct FlakyQuery {
        inner: GzipVcfQuery,
        failing: &'static str,
    }

    impl VariantQuery for FlakyQuery {
        fn list_samples(&self, shard: &Path) -> Result<Vec<String>, QueryError> {
            if shard.ends_with(self.failing) {
                return Err(QueryError::MissingHeader(shard.to_path_buf()));
            }
            self.inner.list_samples(shard)
        }

        fn stream_records(&self, shard: &Path, samples: &[String]) -> Result<RecordLines, QueryError> {
            self.inner.stream_records(shard, samples)
        }
    }

    /// Query backend whose record stream breaks for one shard
    struct BrokenStream {
        inner: GzipVcfQuery,
        failing: &'static str,
        /// Lines yielded before the stream errors; `None` fails on open
        fail_after: Option<usize>,
    }

    impl VariantQuery for BrokenStream {
        fn list_samples(&self, shard: &Path) -> Result<Vec<String>, QueryError> {
            self.inner.list_samples(shard)
        }

        fn stream_records(&self, shard: &Path, samples: &[String]) -> Result<RecordLines, QueryError> {
            if !shard.ends_with(self.failing) {
                return self.inner.stream_records(shard, samples);
            }
            let failure = || QueryError::Failed {
                program: "bcftools".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "truncated file".to_string(),
            };
            match self.fail_after {
                None => Err(failure()),
                Some(n) => {
                    let lines = self.inner.stream_records(shard, samples)?.take(n);
                    Ok(Box::new(lines.chain(std::iter::once(Err(failure())))))
                }
            }
        }
    }

    #[test]
    fn test_stream_failure_skips_shard_and_keeps_others() {
        let fx = fixture();
        let extractor = Extractor::new(
            fx.store.clone(),
            BrokenStream {
                inner: GzipVcfQuery::new(),
                failing: "chr1.vcf.gz",
                fail_after: None,
            },
            config(fx.work.path(), CohortRange::new(1, 3), None),
        );
        let summary = extractor.run().unwrap();

        assert_eq!(summary.shards_skipped, 1);
        assert_eq!(summary.shards_processed, 1);
        assert_eq!(summary.records_written, 1);

        // Header still covers chr1's samples; only the healthy shard has rows
        let table = fx
            .store
            .read_text("SNP_Indv_Sanos/snp_individuals_data_2.csv")
            .unwrap();
        assert_eq!(
            table,
            "CHROM,POS,ID,REF,ALT,HG03,HG01,HG02\nX,500,rs5,T,C,,,1|1\n"
        );
    }

    #[test]
    fn test_mid_stream_failure_keeps_written_rows() {
        let fx = fixture();
        let extractor = Extractor::new(
            fx.store.clone(),
            BrokenStream {
                inner: GzipVcfQuery::new(),
                failing: "chr1.vcf.gz",
                fail_after: Some(1),
            },
            config(fx.work.path(), CohortRange::new(1, 3), None),
        );
        let summary = extractor.run().unwrap();

        assert_eq!(summary.shards_skipped, 1);
        assert_eq!(summary.shards_processed, 1);
        assert_eq!(summary.records_written, 2);

        let table = fx
            .store
            .read_text("SNP_Indv_Sanos/snp_individuals_data_2.csv")
            .unwrap();
        assert_eq!(
            table,
            "\
CHROM,POS,ID,REF,ALT,HG03,HG01,HG02
1,100,rs1,A,G,1|1,0|0,0|1
X,500,rs5,T,C,,,1|1
"
        );
    }

    #[test]
    fn test_failing_shard_is_skipped() {
        let fx = fixture();
        let extractor = Extractor::new(
            fx.store.clone(),
            FlakyQuery {
                inner: GzipVcfQuery::new(),
                failing: "chr1.vcf.gz",
            },
            config(fx.work.path(), CohortRange::new(1, 3), None),
        );
        let summary = extractor.run().unwrap();

        assert_eq!(summary.shards_skipped, 1);
        assert_eq!(summary.shards_processed, 1);
        assert_eq!(summary.samples, vec!["HG02"]);

        let table = fx
            .store
            .read_text("SNP_Indv_Sanos/snp_individuals_data_2.csv")
            .unwrap();
        assert_eq!(table, "CHROM,POS,ID,REF,ALT,HG02\nX,500,rs5,T,C,1|1\n");
    }

    #[test]
    fn test_shard_without_requested_samples_is_skipped() {
        let fx = fixture();
        // Candidates: HG03, HG01, HG02, HG07, HG04 -> pick HG04 only
        let extractor = Extractor::new(
            fx.store.clone(),
            GzipVcfQuery::new(),
            config(fx.work.path(), CohortRange::new(5, 5), None),
        );
        let summary = extractor.run().unwrap();

        assert_eq!(summary.shards_skipped, 2);
        assert_eq!(summary.records_written, 0);
        assert_eq!(
            fx.store
                .read_text("SNP_Indv_Sanos/snp_individuals_data_2.csv")
                .unwrap(),
            "CHROM,POS,ID,REF,ALT\n"
        );
    }
}
