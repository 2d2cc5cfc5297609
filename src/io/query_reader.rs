// Query input: FASTA or FASTQ, optionally gzip-compressed.
//
// The format is detected from the first byte of the (decompressed) stream,
// gzip from the file's magic bytes plus the .gz extension. Sequences are
// uppercased on the way in; reads are kept in input order and later phases
// index results by position in this batch.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bio::io::{fasta, fastq};
use flate2::read::MultiGzDecoder;

use crate::error::{AlignError, Result};

/// Batch of query reads.
pub struct ReadBatch {
    pub names: Vec<String>,
    pub seqs: Vec<Vec<u8>>,
}

impl ReadBatch {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            seqs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn push(&mut self, name: &str, seq: &[u8]) -> Result<()> {
        if seq.is_empty() {
            return Err(AlignError::InvalidArgument(format!(
                "query {:?} has an empty sequence",
                name
            )));
        }
        self.names.push(name.to_string());
        self.seqs.push(seq.to_ascii_uppercase());
        Ok(())
    }
}

impl Default for ReadBatch {
    fn default() -> Self {
        Self::new()
    }
}

fn is_gzip(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("gz") {
        return false;
    }
    let mut magic = [0u8; 2];
    match File::open(path) {
        Ok(mut f) => f.read_exact(&mut magic).is_ok() && magic == [0x1f, 0x8b],
        Err(_) => false,
    }
}

/// Read all queries from a FASTA/FASTQ file into memory.
pub fn read_queries(path: &Path) -> Result<ReadBatch> {
    let file = File::open(path).map_err(|e| {
        AlignError::InvalidArgument(format!("cannot open {}: {}", path.display(), e))
    })?;

    let mut bytes = Vec::new();
    if is_gzip(path) {
        MultiGzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(|e| AlignError::MalformedQuery(format!("gzip stream error: {}", e)))?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes).map_err(AlignError::Io)?;
    }

    let mut batch = ReadBatch::new();
    match bytes.first() {
        Some(b'>') => {
            for record in fasta::Reader::new(bytes.as_slice()).records() {
                let record = record
                    .map_err(|e| AlignError::MalformedQuery(format!("bad FASTA record: {}", e)))?;
                batch.push(record.id(), record.seq())?;
            }
        }
        Some(b'@') => {
            for record in fastq::Reader::new(bytes.as_slice()).records() {
                let record = record
                    .map_err(|e| AlignError::MalformedQuery(format!("bad FASTQ record: {}", e)))?;
                batch.push(record.id(), record.seq())?;
            }
        }
        Some(_) => {
            return Err(AlignError::MalformedQuery(format!(
                "{} is neither FASTA nor FASTQ",
                path.display()
            )));
        }
        None => {}
    }

    if batch.is_empty() {
        log::warn!("no query sequences in {}", path.display());
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_temp(name: &str, contents: &[u8]) -> tempfile::TempPath {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dag-align-test-{}-{}", std::process::id(), name));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        tempfile::TempPath::from_path(path)
    }

    #[test]
    fn reads_fasta_and_uppercases() {
        let f = write_temp("a.fa", b">r1\nacgt\n>r2\nTTGA\n");
        let batch = read_queries(&f).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.names[0], "r1");
        assert_eq!(batch.seqs[0], b"ACGT");
        assert_eq!(batch.seqs[1], b"TTGA");
    }

    #[test]
    fn reads_fastq() {
        let f = write_temp("a.fq", b"@r1\nACGT\n+\nIIII\n");
        let batch = read_queries(&f).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.seqs[0], b"ACGT");
    }

    #[test]
    fn reads_gzipped_fasta() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b">r1\nACGT\n").unwrap();
        let f = write_temp("a.fa.gz", &enc.finish().unwrap());
        let batch = read_queries(&f).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.seqs[0], b"ACGT");
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let f = write_temp("b.fa", b">r1\n\n>r2\nACGT\n");
        assert!(matches!(
            read_queries(&f),
            Err(AlignError::InvalidArgument(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let f = write_temp("c.fa", b"ACGT\n");
        assert!(matches!(read_queries(&f), Err(AlignError::MalformedQuery(_))));
    }
}
