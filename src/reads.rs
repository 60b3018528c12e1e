//! Streaming read sources and format-preserving writers
//!
//! Supported inputs:
//! - FASTQ, plain or compressed (gzip, bzip2, xz), parsed with `seq_io`
//! - SAM and BAM, read and written through `rust-htslib`
//!
//! FASTQ compression is detected from the file content by `niffler`; the
//! sequence format is taken from the file name. Cleared output always stays
//! in the format (and compression) of its input.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rust_htslib::bam::{self, Read as BamRead};
use seq_io::fastq::Record;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Phred score offset of FASTQ quality strings
pub const PHRED_OFFSET: u8 = 33;

/// Symbol written for masked base calls
pub const UNKNOWN_BASE: u8 = b'N';

/// BAM quality byte marking an absent quality string (`*` in SAM)
const MISSING_QUALITY: u8 = 0xff;

const FLAG_SECONDARY: u16 = 0x100;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

const FORMAT_SUFFIXES: &[(&str, SequenceFormat)] = &[
    (".fastq", SequenceFormat::Fastq),
    (".fq", SequenceFormat::Fastq),
    (".sam", SequenceFormat::Sam),
    (".bam", SequenceFormat::Bam),
];

const COMPRESSION_SUFFIXES: &[&str] = &[".gz", ".bgz", ".bz2", ".xz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    Fastq,
    Sam,
    Bam,
}

/// File name split around its sequence format suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameParts {
    /// Name without format and compression suffixes, e.g. `sample`
    pub stem: String,
    /// Format and compression suffixes, e.g. `.fastq.gz`
    pub extension: String,
    pub format: SequenceFormat,
}

impl SequenceFormat {
    /// Detect the format from a path such as `reads.fq.gz` or `aln.bam`
    ///
    /// Compression suffixes are only accepted for FASTQ.
    pub fn detect(path: &Path) -> Result<FileNameParts> {
        let unsupported = || Error::UnsupportedFormat(path.to_path_buf());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(unsupported)?;
        let lower = name.to_ascii_lowercase();

        let compressed = COMPRESSION_SUFFIXES
            .iter()
            .find_map(|suffix| lower.strip_suffix(suffix));
        let without_compression = compressed.unwrap_or(&lower);

        let (suffix, format) = FORMAT_SUFFIXES
            .iter()
            .find(|(suffix, _)| without_compression.ends_with(suffix))
            .ok_or_else(unsupported)?;
        if compressed.is_some() && format.is_alignment() {
            return Err(unsupported());
        }

        let stem_len = without_compression.len() - suffix.len();
        if stem_len == 0 {
            return Err(unsupported());
        }
        Ok(FileNameParts {
            stem: name[..stem_len].to_string(),
            extension: name[stem_len..].to_string(),
            format: *format,
        })
    }

    pub fn is_alignment(self) -> bool {
        matches!(self, Self::Sam | Self::Bam)
    }

    fn hts_format(self) -> Option<bam::Format> {
        match self {
            Self::Fastq => None,
            Self::Sam => Some(bam::Format::Sam),
            Self::Bam => Some(bam::Format::Bam),
        }
    }
}

/// Compression applied to a FASTQ input, mirrored on cleared output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    fn from_niffler(format: niffler::compression::Format) -> Self {
        match format {
            niffler::compression::Format::Gzip => Self::Gzip,
            niffler::compression::Format::Bzip => Self::Bzip2,
            niffler::compression::Format::Lzma => Self::Xz,
            _ => Self::None,
        }
    }

    fn to_niffler(self) -> niffler::compression::Format {
        match self {
            Self::None => niffler::compression::Format::No,
            Self::Gzip => niffler::compression::Format::Gzip,
            Self::Bzip2 => niffler::compression::Format::Bzip,
            Self::Xz => niffler::compression::Format::Lzma,
        }
    }
}

/// One decoded read
#[derive(Debug, Clone, Default)]
pub struct ReadRecord {
    /// Raw FASTQ header line without `@`, or the SAM/BAM QNAME
    pub head: Vec<u8>,
    pub sequence: Vec<u8>,
    /// Phred+33 encoded qualities; `None` when the alignment carries none
    pub quality: Option<Vec<u8>>,
    /// MAPQ of aligned reads; `None` for FASTQ and for MAPQ 255
    pub mapping_quality: Option<u8>,
    /// SAM flag bits, 0 for FASTQ
    pub flags: u16,
    alignment: Option<bam::Record>,
}

impl ReadRecord {
    pub fn new(head: impl Into<Vec<u8>>, sequence: &[u8], quality: &[u8]) -> Self {
        Self {
            head: head.into(),
            sequence: sequence.to_vec(),
            quality: Some(quality.to_vec()),
            ..Self::default()
        }
    }

    /// Decode an htslib record, keeping it for byte-exact output
    pub fn from_alignment(record: bam::Record) -> Self {
        let raw_quality = record.qual();
        let quality = match raw_quality.first() {
            None | Some(&MISSING_QUALITY) => None,
            Some(_) => Some(
                raw_quality
                    .iter()
                    .map(|q| q.saturating_add(PHRED_OFFSET))
                    .collect(),
            ),
        };
        let mapq = record.mapq();
        Self {
            head: record.qname().to_vec(),
            sequence: record.seq().as_bytes(),
            quality,
            mapping_quality: (mapq != 255).then_some(mapq),
            flags: record.flags(),
            alignment: Some(record),
        }
    }

    /// Identifier text used for coordinate parsing
    pub fn identifier(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.head)
    }

    /// False for secondary and supplementary alignments
    pub fn is_primary(&self) -> bool {
        self.flags & (FLAG_SECONDARY | FLAG_SUPPLEMENTARY) == 0
    }

    /// Mean Phred score, `None` without a quality string and 0 for an empty one
    pub fn mean_quality(&self) -> Option<f64> {
        let quality = self.quality.as_deref()?;
        if quality.is_empty() {
            return Some(0.0);
        }
        let sum: u64 = quality
            .iter()
            .map(|&q| u64::from(q.saturating_sub(PHRED_OFFSET)))
            .sum();
        Some(sum as f64 / quality.len() as f64)
    }

    /// Phred score at each base position
    pub fn phred_scores(&self) -> impl Iterator<Item = u8> + '_ {
        self.quality
            .iter()
            .flatten()
            .map(|&q| q.saturating_sub(PHRED_OFFSET))
    }
}

/// Streaming reader over a sequence file
pub struct ReadSource {
    path: PathBuf,
    format: SequenceFormat,
    compression: Compression,
    inner: SourceInner,
}

enum SourceInner {
    Fastq(seq_io::fastq::Reader<Box<dyn Read>>),
    Alignment(bam::Reader),
}

impl ReadSource {
    /// Open a FASTQ, SAM or BAM file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = SequenceFormat::detect(path)?.format;
        if format.is_alignment() {
            let reader = bam::Reader::from_path(path).map_err(|source| Error::Htslib {
                path: path.to_path_buf(),
                source,
            })?;
            return Ok(Self {
                path: path.to_path_buf(),
                format,
                compression: Compression::None,
                inner: SourceInner::Alignment(reader),
            });
        }

        let (handle, niffler_format) =
            niffler::from_path(path).map_err(|source| Error::Compression {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_reader(path, handle, Compression::from_niffler(niffler_format)))
    }

    /// Wrap an already opened FASTQ stream; `path` is only used in messages
    pub fn from_reader(path: &Path, handle: Box<dyn Read>, compression: Compression) -> Self {
        Self {
            path: path.to_path_buf(),
            format: SequenceFormat::Fastq,
            compression,
            inner: SourceInner::Fastq(seq_io::fastq::Reader::new(handle)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SequenceFormat {
        self.format
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Header for writing records of this source (alignments only)
    pub fn alignment_header(&self) -> Option<bam::Header> {
        match &self.inner {
            SourceInner::Fastq(_) => None,
            SourceInner::Alignment(reader) => Some(bam::Header::from_template(reader.header())),
        }
    }
}

impl Iterator for ReadSource {
    type Item = Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            SourceInner::Fastq(reader) => {
                let record = match reader.next()? {
                    Ok(record) => record,
                    Err(source) => {
                        return Some(Err(Error::Fastq {
                            path: self.path.clone(),
                            source,
                        }))
                    }
                };
                Some(Ok(ReadRecord::new(record.head(), record.seq(), record.qual())))
            }
            SourceInner::Alignment(reader) => {
                let mut record = bam::Record::new();
                match reader.read(&mut record)? {
                    Ok(()) => Some(Ok(ReadRecord::from_alignment(record))),
                    Err(source) => Some(Err(Error::Htslib {
                        path: self.path.clone(),
                        source,
                    })),
                }
            }
        }
    }
}

struct OutputState {
    file: BufWriter<File>,
    error: Option<io::Error>,
}

/// Handle given to compressors; remembers the first failed write
struct SharedWriter(Arc<Mutex<OutputState>>);

impl SharedWriter {
    fn track<T>(state: &mut OutputState, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            state
                .error
                .get_or_insert_with(|| io::Error::new(e.kind(), e.to_string()));
        }
        result
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock();
        let result = state.file.write(buf);
        Self::track(&mut state, result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.0.lock();
        let result = state.file.flush();
        Self::track(&mut state, result)
    }
}

/// Buffered output file
///
/// Compressors write their trailer when dropped and discard any error
/// doing so. Writers handed out by [`OutputFile::writer`] record such
/// errors, and [`OutputFile::finish`] reports them.
pub struct OutputFile {
    path: PathBuf,
    state: Arc<Mutex<OutputState>>,
}

impl OutputFile {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            state: Arc::new(Mutex::new(OutputState {
                file: BufWriter::new(file),
                error: None,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writer into this file, compressing when asked to
    pub fn writer(&self, compression: Compression) -> Result<Box<dyn Write>> {
        let shared: Box<dyn Write> = Box::new(SharedWriter(self.state.clone()));
        if compression == Compression::None {
            return Ok(shared);
        }
        niffler::get_writer(
            shared,
            compression.to_niffler(),
            niffler::compression::Level::Six,
        )
        .map_err(|source| Error::Compression {
            path: self.path.clone(),
            source,
        })
    }

    /// Flush and sync; call once every writer has been dropped
    pub fn finish(self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(e) = state.error.take() {
            return Err(Error::io(&self.path, e));
        }
        state.file.flush().map_err(|e| Error::io(&self.path, e))?;
        state
            .file
            .get_ref()
            .sync_all()
            .map_err(|e| Error::io(&self.path, e))
    }
}

/// Destination of cleared records
pub trait RecordSink {
    /// Copy a record unchanged
    fn write(&mut self, record: &ReadRecord) -> Result<()>;

    /// Write a record with every base call replaced by `N`, qualities kept
    fn write_masked(&mut self, record: &ReadRecord) -> Result<()>;
}

/// FASTQ output from the raw header, sequence and quality bytes
pub struct FastqWriter<W: Write> {
    out: W,
    path: PathBuf,
}

impl<W: Write> FastqWriter<W> {
    /// `path` is only used in error messages
    pub fn new(out: W, path: impl Into<PathBuf>) -> Self {
        Self {
            out,
            path: path.into(),
        }
    }

    fn write_fields(&mut self, record: &ReadRecord, sequence: &[u8]) -> Result<()> {
        seq_io::fastq::write_to(
            &mut self.out,
            &record.head,
            sequence,
            record.quality.as_deref().unwrap_or_default(),
        )
        .map_err(|e| Error::io(&self.path, e))
    }

    /// Flush buffered output and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.out.flush().map_err(|e| Error::io(&self.path, e))?;
        Ok(self.out)
    }
}

impl<W: Write> RecordSink for FastqWriter<W> {
    fn write(&mut self, record: &ReadRecord) -> Result<()> {
        self.write_fields(record, &record.sequence)
    }

    fn write_masked(&mut self, record: &ReadRecord) -> Result<()> {
        let masked = vec![UNKNOWN_BASE; record.sequence.len()];
        self.write_fields(record, &masked)
    }
}

/// SAM or BAM output through htslib
pub struct AlignmentWriter {
    inner: bam::Writer,
    path: PathBuf,
}

impl AlignmentWriter {
    pub fn create(path: &Path, header: &bam::Header, format: SequenceFormat) -> Result<Self> {
        let hts_format = format
            .hts_format()
            .ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
        let inner = bam::Writer::from_path(path, header, hts_format).map_err(|source| Error::Htslib {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    fn alignment<'r>(&self, record: &'r ReadRecord) -> Result<&'r bam::Record> {
        record
            .alignment
            .as_ref()
            .ok_or_else(|| Error::UnsupportedFormat(self.path.clone()))
    }

    fn write_alignment(&mut self, record: &bam::Record) -> Result<()> {
        self.inner.write(record).map_err(|source| Error::Htslib {
            path: self.path.clone(),
            source,
        })
    }
}

impl RecordSink for AlignmentWriter {
    fn write(&mut self, record: &ReadRecord) -> Result<()> {
        let alignment = self.alignment(record)?;
        self.write_alignment(alignment)
    }

    fn write_masked(&mut self, record: &ReadRecord) -> Result<()> {
        let alignment = self.alignment(record)?;
        let mut masked = alignment.clone();
        let bases = vec![UNKNOWN_BASE; alignment.seq_len()];
        let cigar = alignment.cigar().take();
        masked.set(alignment.qname(), Some(&cigar), &bases, alignment.qual());
        self.write_alignment(&masked)
    }
}

/// Writer matching the format and compression of a source
pub enum OutputSink {
    Fastq {
        writer: FastqWriter<Box<dyn Write>>,
        file: OutputFile,
    },
    Alignment(AlignmentWriter),
}

impl OutputSink {
    /// Create `path` for records of `source`
    pub fn for_source(source: &ReadSource, path: &Path) -> Result<Self> {
        match source.alignment_header() {
            Some(header) => Ok(Self::Alignment(AlignmentWriter::create(
                path,
                &header,
                source.format(),
            )?)),
            None => {
                let file = OutputFile::create(path)?;
                let writer = FastqWriter::new(file.writer(source.compression())?, path);
                Ok(Self::Fastq { writer, file })
            }
        }
    }

    /// Complete the file; every buffered byte is on disk afterwards
    pub fn finish(self) -> Result<()> {
        match self {
            Self::Fastq { writer, file } => {
                let out = writer.finish()?;
                // compressors write their trailer on drop
                drop(out);
                file.finish()
            }
            // htslib closes the file on drop
            Self::Alignment(writer) => {
                drop(writer);
                Ok(())
            }
        }
    }
}

impl RecordSink for OutputSink {
    fn write(&mut self, record: &ReadRecord) -> Result<()> {
        match self {
            Self::Fastq { writer, .. } => writer.write(record),
            Self::Alignment(writer) => writer.write(record),
        }
    }

    fn write_masked(&mut self, record: &ReadRecord) -> Result<()> {
        match self {
            Self::Fastq { writer, .. } => writer.write_masked(record),
            Self::Alignment(writer) => writer.write_masked(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FASTQ: &[u8] = b"@I:R:FC1:1:11:100:200 1:N:0:AC\nACGT\n+\nIIII\n\
@I:R:FC1:1:11:900:800 1:N:0:\xff\xfe\nGGCC\n+\n####\n";

    const SAM: &str = "@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:1000\n\
I:R:FC1:1:11:100:200\t0\tchr1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII\tNM:i:0\n\
I:R:FC1:1:11:100:200\t256\tchr1\t500\t0\t4M\t*\t0\t0\t*\t*\n\
I:R:FC1:1:11:900:800\t4\t*\t0\t255\t*\t*\t0\t0\tGGCC\t####\n";

    fn fastq_source(bytes: &'static [u8]) -> ReadSource {
        ReadSource::from_reader(Path::new("test"), Box::new(Cursor::new(bytes)), Compression::None)
    }

    fn sam_file(dir: &Path) -> PathBuf {
        let path = dir.join("aln.sam");
        std::fs::write(&path, SAM).unwrap();
        path
    }

    fn copy_alignments(input: &Path, output: &Path, mask_first: bool) {
        let source = ReadSource::open(input).unwrap();
        let mut sink = OutputSink::for_source(&source, output).unwrap();
        for (i, record) in source.enumerate() {
            let record = record.unwrap();
            if mask_first && i == 0 {
                sink.write_masked(&record).unwrap();
            } else {
                sink.write(&record).unwrap();
            }
        }
        sink.finish().unwrap();
    }

    fn sam_to_bam(sam: &Path, bam: &Path) {
        let source = ReadSource::open(sam).unwrap();
        let header = source.alignment_header().unwrap();
        let mut writer = AlignmentWriter::create(bam, &header, SequenceFormat::Bam).unwrap();
        for record in source {
            writer.write(&record.unwrap()).unwrap();
        }
    }

    #[test]
    fn test_detect_format_and_split_name() {
        let parts = SequenceFormat::detect(Path::new("/data/sample_R1.fastq.gz")).unwrap();
        assert_eq!(parts.stem, "sample_R1");
        assert_eq!(parts.extension, ".fastq.gz");
        assert_eq!(parts.format, SequenceFormat::Fastq);

        let parts = SequenceFormat::detect(Path::new("run.FQ")).unwrap();
        assert_eq!(parts.stem, "run");
        assert_eq!(parts.extension, ".FQ");

        let parts = SequenceFormat::detect(Path::new("aln.sam")).unwrap();
        assert_eq!(parts.format, SequenceFormat::Sam);
        let parts = SequenceFormat::detect(Path::new("aln.bam")).unwrap();
        assert_eq!((parts.stem.as_str(), parts.format), ("aln", SequenceFormat::Bam));

        assert!(SequenceFormat::detect(Path::new("aln.sam.gz")).is_err());
        assert!(SequenceFormat::detect(Path::new(".fastq")).is_err());
        assert!(SequenceFormat::detect(Path::new("reads.txt")).is_err());
    }

    #[test]
    fn test_mean_quality() {
        let record = ReadRecord::new("r", b"ACGT", b"I5+!");
        // I=40, 5=20, +=10, !=0
        assert!((record.mean_quality().unwrap() - 17.5).abs() < 1e-9);
        assert_eq!(ReadRecord::new("r", b"", b"").mean_quality(), Some(0.0));

        let mut missing = ReadRecord::new("r", b"ACGT", b"");
        missing.quality = None;
        assert_eq!(missing.mean_quality(), None);
        assert_eq!(missing.phred_scores().count(), 0);
    }

    #[test]
    fn test_fastq_round_trip_is_byte_identical() {
        let records: Vec<ReadRecord> = fastq_source(FASTQ).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier(), "I:R:FC1:1:11:100:200 1:N:0:AC");
        assert_eq!(records[1].head, b"I:R:FC1:1:11:900:800 1:N:0:\xff\xfe");
        assert_eq!(records[1].quality.as_deref(), Some(&b"####"[..]));
        assert!(records[1].is_primary());

        let mut out = Vec::new();
        let mut writer = FastqWriter::new(&mut out, "memory");
        for record in &records {
            writer.write(record).unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(out, FASTQ);
    }

    #[test]
    fn test_fastq_masking_keeps_quality() {
        let record = ReadRecord::new("I:1:2:3:4", b"ACGTA", b"IIIII");
        let mut out = Vec::new();
        let mut writer = FastqWriter::new(&mut out, "memory");
        writer.write_masked(&record).unwrap();
        writer.finish().unwrap();
        assert_eq!(out, b"@I:1:2:3:4\nNNNNN\n+\nIIIII\n");
    }

    #[test]
    fn test_sam_source_fields() {
        let dir = tempfile::tempdir().unwrap();
        let source = ReadSource::open(sam_file(dir.path())).unwrap();
        assert_eq!(source.format(), SequenceFormat::Sam);
        assert!(source.alignment_header().is_some());

        let records: Vec<ReadRecord> = source.collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].identifier(), "I:R:FC1:1:11:100:200");
        assert_eq!(records[0].mapping_quality, Some(60));
        assert_eq!(records[0].quality.as_deref(), Some(&b"IIII"[..]));
        assert_eq!(records[0].sequence, b"ACGT");

        assert!(!records[1].is_primary());
        assert_eq!(records[1].quality, None);
        assert_eq!(records[1].mean_quality(), None);

        assert!(records[2].is_primary());
        assert_eq!(records[2].mapping_quality, None);
        assert_eq!(records[2].sequence, b"GGCC");
    }

    #[test]
    fn test_sam_round_trip_and_masking() {
        let dir = tempfile::tempdir().unwrap();
        let input = sam_file(dir.path());
        let output = dir.path().join("out.sam");
        copy_alignments(&input, &output, true);

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "@HD\tVN:1.6\tSO:unsorted");
        assert_eq!(lines[1], "@SQ\tSN:chr1\tLN:1000");
        assert_eq!(
            lines[2],
            "I:R:FC1:1:11:100:200\t0\tchr1\t10\t60\t4M\t*\t0\t0\tNNNN\tIIII\tNM:i:0"
        );
        assert_eq!(lines[3], "I:R:FC1:1:11:100:200\t256\tchr1\t500\t0\t4M\t*\t0\t0\t*\t*");
        assert_eq!(lines[4], "I:R:FC1:1:11:900:800\t4\t*\t0\t255\t*\t*\t0\t0\tGGCC\t####");
    }

    #[test]
    fn test_bam_round_trip_and_masking() {
        let dir = tempfile::tempdir().unwrap();
        let sam = sam_file(dir.path());
        let bam = dir.path().join("aln.bam");
        sam_to_bam(&sam, &bam);
        // BGZF magic
        assert_eq!(&std::fs::read(&bam).unwrap()[..2], &[0x1f, 0x8b]);

        let masked = dir.path().join("masked.bam");
        copy_alignments(&bam, &masked, true);

        let records: Vec<ReadRecord> = ReadSource::open(&masked)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sequence, b"NNNN");
        assert_eq!(records[0].quality.as_deref(), Some(&b"IIII"[..]));
        assert_eq!(records[0].mapping_quality, Some(60));
        assert_eq!(records[2].sequence, b"GGCC");
        let masked_bytes = std::fs::read(&masked).unwrap();
        assert_eq!(&masked_bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_output_file_reports_failed_flush() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        for compression in [Compression::None, Compression::Gzip] {
            let output = OutputFile::create(full).unwrap();
            {
                let mut writer = output.writer(compression).unwrap();
                writer.write_all(b"@r\nACGT\n+\nIIII\n").unwrap();
            }
            assert!(matches!(output.finish(), Err(Error::Io { .. })));
        }
    }

    #[test]
    fn test_output_file_round_trip_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fastq.gz");
        let output = OutputFile::create(&path).unwrap();
        {
            let mut writer = output.writer(Compression::Gzip).unwrap();
            writer.write_all(FASTQ).unwrap();
        }
        output.finish().unwrap();

        let source = ReadSource::open(&path).unwrap();
        assert_eq!(source.compression(), Compression::Gzip);
        assert_eq!(source.count(), 2);
    }
}
