use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;
use serde::Serialize;

use crate::error::BigscriptError;

pub const RESULTS_HEADER: &str = "Filename\tA\tT\tG\tC\tN\tOther";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaseCounts {
    pub a: u64,
    pub t: u64,
    pub g: u64,
    pub c: u64,
    pub n: u64,
    pub other: u64,
}

impl BaseCounts {
    pub fn add_sequence(&mut self, seq: &[u8]) {
        for &base in seq {
            match base.to_ascii_uppercase() {
                b'A' => self.a += 1,
                b'T' => self.t += 1,
                b'G' => self.g += 1,
                b'C' => self.c += 1,
                b'N' => self.n += 1,
                b if b.is_ascii_whitespace() => {}
                _ => self.other += 1,
            }
        }
    }

    pub fn from_sequence(seq: &[u8]) -> Self {
        let mut counts = Self::default();
        counts.add_sequence(seq);
        counts
    }

    pub fn from_fasta<R: BufRead>(mut reader: R) -> Result<Self, BigscriptError> {
        let mut counts = Self::default();
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|err| BigscriptError::Filesystem(err.to_string()))?;
            if read == 0 {
                break;
            }
            if line.first() == Some(&b'>') {
                continue;
            }
            counts.add_sequence(&line);
        }
        Ok(counts)
    }

    pub fn total(&self) -> u64 {
        self.a + self.t + self.g + self.c + self.n + self.other
    }

    pub fn gc_fraction(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| (self.g + self.c) as f64 / total as f64)
    }
}

impl fmt::Display for BaseCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.a, self.t, self.g, self.c, self.n, self.other
        )
    }
}

pub fn count_file(path: &Utf8Path) -> Result<BaseCounts, BigscriptError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| BigscriptError::Filesystem(format!("open {path}: {err}")))?;
    let mut reader = BufReader::new(file);
    let gzipped = reader
        .fill_buf()
        .map_err(|err| BigscriptError::Filesystem(format!("read {path}: {err}")))?
        .starts_with(&[0x1f, 0x8b]);
    if gzipped {
        BaseCounts::from_fasta(BufReader::new(MultiGzDecoder::new(reader)))
    } else {
        BaseCounts::from_fasta(reader)
    }
}

pub fn results_line(path: &Utf8Path, counts: &BaseCounts) -> String {
    let name = path.file_name().unwrap_or(path.as_str());
    format!("{name}\t{counts}")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use camino::Utf8PathBuf;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    const FASTA: &[u8] = b">contig_1\nACGTN\nGGCC\n";

    #[test]
    fn counts_each_base_once() {
        let counts = BaseCounts::from_sequence(b"ATGCN");
        assert_eq!(
            counts,
            BaseCounts {
                a: 1,
                t: 1,
                g: 1,
                c: 1,
                n: 1,
                other: 0
            }
        );
        assert_eq!(counts.to_string(), "1\t1\t1\t1\t1\t0");
    }

    #[test]
    fn lowercase_and_ambiguity_codes() {
        let counts = BaseCounts::from_sequence(b"acgtRYn-");
        assert_eq!((counts.a, counts.c, counts.g, counts.t), (1, 1, 1, 1));
        assert_eq!(counts.n, 1);
        assert_eq!(counts.other, 3);
    }

    #[test]
    fn fasta_headers_are_skipped() {
        let fasta = b">contig_1 len=4 GATTACA\nACGT\nGG\r\n>contig_2\nNN\n";
        let counts = BaseCounts::from_fasta(&fasta[..]).unwrap();
        assert_eq!(counts.total(), 8);
        assert_eq!(counts.g, 3);
        assert_eq!(counts.n, 2);
        assert_eq!(counts.gc_fraction(), Some(4.0 / 8.0));
    }

    #[test]
    fn empty_file_has_no_gc_fraction() {
        assert_eq!(BaseCounts::default().gc_fraction(), None);
    }

    #[test]
    fn plain_fasta_file_is_counted() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = dir.join("SAMN01.fa");
        std::fs::write(&path, FASTA).unwrap();

        let counts = count_file(&path).unwrap();
        assert_eq!(counts.total(), 9);
        assert_eq!((counts.g, counts.c), (3, 3));
        assert_eq!(results_line(&path, &counts), "SAMN01.fa\t1\t1\t3\t3\t1\t0");
    }

    #[test]
    fn gzipped_fasta_file_is_counted() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = dir.join("SAMN01.fa.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(FASTA).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let counts = count_file(&path).unwrap();
        assert_eq!(counts, BaseCounts::from_fasta(FASTA).unwrap());
    }

    #[test]
    fn empty_file_counts_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = dir.join("empty.fa");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(count_file(&path).unwrap(), BaseCounts::default());
    }
}
