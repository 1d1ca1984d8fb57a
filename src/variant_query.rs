// ==============================================================================
// variant_query.rs - Variant Query Backends
// ==============================================================================
// Description: Sample listing and genotype record streaming for VCF shards
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Record line format (one per variant, tab-delimited):
//   CHROM  POS  ID  REF  ALT  GT(sample 1) ... GT(sample n)
// Samples appear in the order they were requested.
// ==============================================================================

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::{debug, warn};

/// bcftools output template matching the record line format
pub const QUERY_FORMAT: &str = "%CHROM\t%POS\t%ID\t%REF\t%ALT[\t%GT]\n";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No #CHROM header line in {0}")]
    MissingHeader(PathBuf),

    #[error("Sample {sample} not present in {path}")]
    UnknownSample { sample: String, path: PathBuf },
}

/// Lazily produced record lines of one shard
pub type RecordLines = Box<dyn Iterator<Item = Result<String, QueryError>>>;

/// Read-only access to VCF shards
pub trait VariantQuery {
    /// Sample names declared by the shard, in file order
    fn list_samples(&self, shard: &Path) -> Result<Vec<String>, QueryError>;

    /// Stream one record line per variant for `samples`, in request order
    fn stream_records(&self, shard: &Path, samples: &[String]) -> Result<RecordLines, QueryError>;
}

// ------------------------------------------------------------------------------
// bcftools
// ------------------------------------------------------------------------------

/// Runs the external `bcftools query` tool
#[derive(Debug, Clone)]
pub struct BcftoolsQuery {
    binary: PathBuf,
}

impl BcftoolsQuery {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn program(&self) -> String {
        self.binary.display().to_string()
    }
}

impl Default for BcftoolsQuery {
    fn default() -> Self {
        Self::new("bcftools")
    }
}

impl VariantQuery for BcftoolsQuery {
    fn list_samples(&self, shard: &Path) -> Result<Vec<String>, QueryError> {
        let output = Command::new(&self.binary)
            .args(["query", "-l"])
            .arg(shard)
            .output()
            .map_err(|source| QueryError::Spawn {
                program: self.program(),
                source,
            })?;

        if !output.status.success() {
            return Err(QueryError::Failed {
                program: self.program(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn stream_records(&self, shard: &Path, samples: &[String]) -> Result<RecordLines, QueryError> {
        debug!("bcftools query -s {} -f '{}' {:?}", samples.join(","), QUERY_FORMAT.escape_debug(), shard);

        // stderr goes straight to the operator; piping it unread could stall the child
        let mut child = Command::new(&self.binary)
            .args(["query", "-s"])
            .arg(samples.join(","))
            .args(["-f", QUERY_FORMAT])
            .arg(shard)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| QueryError::Spawn {
                program: self.program(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(QueryError::Spawn {
                program: self.program(),
                source: std::io::Error::other("stdout was not captured"),
            });
        };

        Ok(Box::new(ChildRecords {
            child,
            lines: BufReader::new(stdout).lines(),
            program: self.program(),
            shard: shard.to_path_buf(),
            finished: false,
        }))
    }
}

/// Record lines read from a running child; reaps the child when done or dropped
struct ChildRecords {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    program: String,
    shard: PathBuf,
    finished: bool,
}

impl Iterator for ChildRecords {
    type Item = Result<String, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line)),
            Some(Err(source)) => {
                self.finished = true;
                let _ = self.child.kill();
                let _ = self.child.wait();
                Some(Err(QueryError::Io {
                    path: self.shard.clone(),
                    source,
                }))
            }
            None => {
                self.finished = true;
                match self.child.wait() {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some(Err(QueryError::Failed {
                        program: self.program.clone(),
                        status: status.to_string(),
                        stderr: format!("query on {:?} failed (see stderr above)", self.shard),
                    })),
                    Err(source) => Some(Err(QueryError::Spawn {
                        program: self.program.clone(),
                        source,
                    })),
                }
            }
        }
    }
}

impl Drop for ChildRecords {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

// ------------------------------------------------------------------------------
// In-process gzip VCF reader
// ------------------------------------------------------------------------------

/// Reads bgzip/gzip VCF text directly, without external tools
#[derive(Debug, Clone, Default)]
pub struct GzipVcfQuery;

type VcfLines = Lines<BufReader<MultiGzDecoder<File>>>;

/// First 9 columns of a VCF data line precede the samples
const VCF_FIXED_COLUMNS: usize = 9;

impl GzipVcfQuery {
    pub fn new() -> Self {
        Self
    }

    /// Open a shard and consume its header, returning the declared samples
    fn open(shard: &Path) -> Result<(VcfLines, Vec<String>), QueryError> {
        let io_err = |source| QueryError::Io {
            path: shard.to_path_buf(),
            source,
        };

        let file = File::open(shard).map_err(io_err)?;
        let mut lines = BufReader::new(MultiGzDecoder::new(file)).lines();

        loop {
            let line = match lines.next() {
                Some(line) => line.map_err(io_err)?,
                None => break,
            };
            if line.starts_with("##") {
                continue;
            }
            if line.starts_with("#CHROM") {
                let samples = line
                    .split('\t')
                    .skip(VCF_FIXED_COLUMNS)
                    .map(str::to_string)
                    .collect();
                return Ok((lines, samples));
            }
            break;
        }

        Err(QueryError::MissingHeader(shard.to_path_buf()))
    }
}

impl VariantQuery for GzipVcfQuery {
    fn list_samples(&self, shard: &Path) -> Result<Vec<String>, QueryError> {
        Self::open(shard).map(|(_, samples)| samples)
    }

    fn stream_records(&self, shard: &Path, samples: &[String]) -> Result<RecordLines, QueryError> {
        let (lines, declared) = Self::open(shard)?;

        let columns = samples
            .iter()
            .map(|sample| {
                declared
                    .iter()
                    .position(|d| d == sample)
                    .map(|i| i + VCF_FIXED_COLUMNS)
                    .ok_or_else(|| QueryError::UnknownSample {
                        sample: sample.clone(),
                        path: shard.to_path_buf(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(GzipRecords {
            lines,
            columns,
            shard: shard.to_path_buf(),
        }))
    }
}

struct GzipRecords {
    lines: VcfLines,
    columns: Vec<usize>,
    shard: PathBuf,
}

impl GzipRecords {
    /// Render one VCF data line in record line format
    fn render(&self, line: &str) -> Option<String> {
        let fields: Vec<&str> = line.split('\t').collect();
        let min_fields = if self.columns.is_empty() { 5 } else { VCF_FIXED_COLUMNS };
        if fields.len() < min_fields {
            warn!(
                "Skipping malformed VCF line in {:?}: {} fields",
                self.shard,
                fields.len()
            );
            return None;
        }

        let gt_index = fields
            .get(8)
            .and_then(|format| format.split(':').position(|key| key == "GT"));

        let mut out = fields[..5].join("\t");
        for &column in &self.columns {
            let gt = match (gt_index, fields.get(column)) {
                (Some(idx), Some(sample)) => sample.split(':').nth(idx).unwrap_or("."),
                _ => ".",
            };
            out.push('\t');
            out.push_str(gt);
        }
        Some(out)
    }
}

impl Iterator for GzipRecords {
    type Item = Result<String, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(QueryError::Io {
                        path: self.shard.clone(),
                        source,
                    }))
                }
            };

            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(record) = self.render(&line) {
                return Some(Ok(record));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    pub(crate) const VCF: &str = "\
##fileformat=VCFv4.2
##contig=<ID=1>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tHG01\tHG02\tHG03
1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|1\t1|1
1\t200\trs2\tC\tT\t.\tPASS\t.\tGT:DS\t1|1:2.0\t0|0:0.0\t0|1:1.0
chr2\t300\t.\tG\tA\t.\tPASS\t.\tDS\t0.1\t0.2\t0.3
";

    pub(crate) fn write_gz(path: &Path, contents: &str) {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        std::fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    #[test]
    fn test_gzip_list_samples() {
        let dir = tempfile::TempDir::new().unwrap();
        let shard = dir.path().join("chr1.vcf.gz");
        write_gz(&shard, VCF);

        let samples = GzipVcfQuery::new().list_samples(&shard).unwrap();
        assert_eq!(samples, vec!["HG01", "HG02", "HG03"]);
    }

    #[test]
    fn test_gzip_stream_records_in_request_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let shard = dir.path().join("chr1.vcf.gz");
        write_gz(&shard, VCF);

        let requested = vec!["HG03".to_string(), "HG01".to_string()];
        let lines: Vec<String> = GzipVcfQuery::new()
            .stream_records(&shard, &requested)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            lines,
            vec![
                "1\t100\trs1\tA\tG\t1|1\t0|0",
                "1\t200\trs2\tC\tT\t0|1\t1|1",
                "chr2\t300\t.\tG\tA\t.\t.",
            ]
        );
    }

    #[test]
    fn test_gzip_unknown_sample() {
        let dir = tempfile::TempDir::new().unwrap();
        let shard = dir.path().join("chr1.vcf.gz");
        write_gz(&shard, VCF);

        let result = GzipVcfQuery::new().stream_records(&shard, &["NOPE".to_string()]);
        assert!(matches!(result, Err(QueryError::UnknownSample { .. })));
    }

    #[test]
    fn test_gzip_missing_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let shard = dir.path().join("bad.vcf.gz");
        write_gz(&shard, "##fileformat=VCFv4.2\n1\t100\n");

        assert!(matches!(
            GzipVcfQuery::new().list_samples(&shard),
            Err(QueryError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_bcftools_missing_binary() {
        let query = BcftoolsQuery::new("/nonexistent/bcftools");
        assert!(matches!(
            query.list_samples(Path::new("chr1.vcf.gz")),
            Err(QueryError::Spawn { .. })
        ));
    }
}
