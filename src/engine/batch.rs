// src/engine/batch.rs
//
// Directory-level driver: collect inputs, fan out over the worker pool,
// normalize each file, write outputs atomically. One bad image never stops
// the rest of the run; only configuration errors halt it up front, since
// those would fail every item the same way.

use crate::config::NormalizeConfig;
use crate::engine::encoder::EncodedResult;
use crate::engine::pipeline::NormalizeFlags;
use crate::engine::{io, pool};
use crate::error::ListingImageError;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

type BatchResult<T> = std::result::Result<T, ListingImageError>;

/// Input containers the collector picks up. Matching is by extension,
/// case-insensitive; the decoder re-checks actual magic bytes later.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jfif", "png", "bmp", "gif", "tif", "tiff", "webp",
];

/// Decides the output file name for each input.
///
/// Implementations are shared across worker threads and across runs, so a
/// stateful namer has to guard its own state.
pub trait OutputNamer: Send + Sync {
    /// File name (without directory) for the output derived from `input`.
    fn name_for(&self, input: &Path, extension: &'static str) -> PathBuf;
}

/// Names outputs `PREFIX00001.jpg`, `PREFIX00002.jpg`, ... The counter
/// lives across runs, so a second run with the same namer keeps counting
/// instead of overwriting the first run's files.
pub struct SequenceNamer {
    prefix: String,
    width: usize,
    counter: Mutex<u64>,
}

impl SequenceNamer {
    /// Five-digit zero padding, the shape listing upload tools expect.
    pub fn new(prefix: impl Into<String>, start: u64) -> Self {
        Self::with_width(prefix, start, 5)
    }

    pub fn with_width(prefix: impl Into<String>, start: u64, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
            counter: Mutex::new(start),
        }
    }
}

impl OutputNamer for SequenceNamer {
    fn name_for(&self, _input: &Path, extension: &'static str) -> PathBuf {
        let mut counter = self.counter.lock();
        let n = *counter;
        *counter += 1;
        PathBuf::from(format!(
            "{prefix}{n:0width$}.{extension}",
            prefix = self.prefix,
            width = self.width
        ))
    }
}

/// Keeps the input's file stem and swaps the extension, `photo.png` to
/// `photo.jpg`. Collisions between inputs with the same stem are the
/// caller's problem.
pub struct StemNamer;

impl OutputNamer for StemNamer {
    fn name_for(&self, input: &Path, extension: &'static str) -> PathBuf {
        let stem = input
            .file_stem()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("image"));
        stem.with_extension(extension)
    }
}

/// Walk `dir` recursively and return every file with a supported image
/// extension, sorted by name at each directory level so runs are
/// deterministic regardless of filesystem order.
pub fn collect_image_files(dir: &Path) -> BatchResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ListingImageError::file_not_found(
            dir.display().to_string(),
        ));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let io_err = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            ListingImageError::file_read_failed(dir.display().to_string(), io_err)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                SUPPORTED_INPUT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// What happened to one input file.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub result: std::result::Result<BatchSuccess, ListingImageError>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// The success side of an outcome: where the output went and what the
/// encode reported.
#[derive(Clone, Debug)]
pub struct BatchSuccess {
    pub output: PathBuf,
    pub final_width: u32,
    pub final_height: u32,
    pub quality_used: u8,
    pub size_bytes: u64,
    pub met_goal: bool,
    pub flags: NormalizeFlags,
}

impl BatchSuccess {
    fn from_encoded(output: PathBuf, encoded: &EncodedResult) -> Self {
        Self {
            output,
            final_width: encoded.final_width,
            final_height: encoded.final_height,
            quality_used: encoded.quality_used,
            size_bytes: encoded.size_bytes,
            met_goal: encoded.met_goal,
            flags: encoded.flags,
        }
    }
}

/// Roll-up of a finished run, for logs and exit codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successful items whose encode fit the size budget.
    pub met_goal: usize,
    /// Successful items where the long-side cap was waived.
    pub relaxed: usize,
    /// Total bytes written across successful items.
    pub output_bytes: u64,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match &outcome.result {
                Ok(success) => {
                    summary.succeeded += 1;
                    summary.output_bytes += success.size_bytes;
                    if success.met_goal {
                        summary.met_goal += 1;
                    }
                    if success.flags.contains(NormalizeFlags::SIZE_CONSTRAINT_RELAXED) {
                        summary.relaxed += 1;
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// One batch run: a set of inputs, an output directory, and the policy to
/// apply to every item.
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub config: NormalizeConfig,
    /// Whether outputs may replace existing files. Off by default so a
    /// rerun cannot clobber a previous export.
    pub overwrite: bool,
}

impl BatchJob {
    pub fn new(inputs: Vec<PathBuf>, output_dir: impl Into<PathBuf>, config: NormalizeConfig) -> Self {
        Self {
            inputs,
            output_dir: output_dir.into(),
            config,
            overwrite: false,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Run the whole batch. Returns one outcome per input, in input order.
    ///
    /// Output names are assigned sequentially before fan-out, so a
    /// [`SequenceNamer`] numbers files by input order rather than by which
    /// worker finishes first. Per-item failures land in their outcome; the
    /// only errors returned from here are the ones that doom every item.
    pub fn run(&self, namer: &dyn OutputNamer) -> BatchResult<Vec<BatchOutcome>> {
        self.config.validate()?;
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            ListingImageError::file_write_failed(self.output_dir.display().to_string(), e)
        })?;

        let extension = self.config.output.extension();
        let planned: Vec<(PathBuf, PathBuf)> = self
            .inputs
            .iter()
            .map(|input| {
                let output = self.output_dir.join(namer.name_for(input, extension));
                (input.clone(), output)
            })
            .collect();

        debug!(
            items = planned.len(),
            output_dir = %self.output_dir.display(),
            "starting batch run"
        );

        let outcomes = pool::get_pool().install(|| {
            planned
                .par_iter()
                .map(|(input, output)| self.process_one(input, output))
                .collect()
        });
        Ok(outcomes)
    }

    fn process_one(&self, input: &Path, output: &Path) -> BatchOutcome {
        let result: BatchResult<BatchSuccess> = (|| {
            let source = io::open_mapped(input)?;
            let bytes = source.as_bytes().ok_or_else(|| {
                ListingImageError::internal_panic("batch source missing its bytes")
            })?;
            let encoded = crate::normalize(bytes, &self.config)?;
            io::write_atomic(output, &encoded.bytes, self.overwrite)?;
            debug!(
                input = %input.display(),
                output = %output.display(),
                quality = encoded.quality_used,
                size = encoded.size_bytes,
                met_goal = encoded.met_goal,
                "batch item written"
            );
            Ok(BatchSuccess::from_encoded(output.to_path_buf(), &encoded))
        })();

        if let Err(ref error) = result {
            warn!(
                input = %input.display(),
                category = error.category().as_str(),
                error = %error,
                "batch item failed, continuing with the rest"
            );
        }
        BatchOutcome {
            input: input.to_path_buf(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn write_sample_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 40])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &bytes).unwrap();
        path
    }

    mod collect_tests {
        use super::*;

        #[test]
        fn finds_supported_files_sorted_and_recursive() {
            let dir = TempDir::new().unwrap();
            write_sample_png(dir.path(), "b.png", 4, 4);
            write_sample_png(dir.path(), "a.png", 4, 4);
            std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
            let nested = dir.path().join("nested");
            std::fs::create_dir(&nested).unwrap();
            write_sample_png(&nested, "c.png", 4, 4);

            let files = collect_image_files(dir.path()).unwrap();
            let names: Vec<_> = files
                .iter()
                .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
                .collect();
            assert_eq!(
                names,
                vec![
                    PathBuf::from("a.png"),
                    PathBuf::from("b.png"),
                    PathBuf::from("nested/c.png"),
                ]
            );
        }

        #[test]
        fn extension_match_is_case_insensitive() {
            let dir = TempDir::new().unwrap();
            write_sample_png(dir.path(), "UPPER.PNG", 4, 4);
            let files = collect_image_files(dir.path()).unwrap();
            assert_eq!(files.len(), 1);
        }

        #[test]
        fn missing_directory_is_an_error() {
            let err = collect_image_files(Path::new("/nonexistent/input-dir")).unwrap_err();
            assert!(matches!(err, ListingImageError::FileNotFound { .. }));
        }
    }

    mod namer_tests {
        use super::*;

        #[test]
        fn sequence_names_are_zero_padded_and_increment() {
            let namer = SequenceNamer::new("JBY", 1);
            let input = Path::new("whatever.png");
            assert_eq!(namer.name_for(input, "jpg"), PathBuf::from("JBY00001.jpg"));
            assert_eq!(namer.name_for(input, "jpg"), PathBuf::from("JBY00002.jpg"));
        }

        #[test]
        fn sequence_width_is_configurable() {
            let namer = SequenceNamer::with_width("out-", 7, 3);
            assert_eq!(
                namer.name_for(Path::new("x.png"), "png"),
                PathBuf::from("out-007.png")
            );
        }

        #[test]
        fn stem_namer_swaps_extension() {
            assert_eq!(
                StemNamer.name_for(Path::new("/inputs/photo.png"), "jpg"),
                PathBuf::from("photo.jpg")
            );
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn processes_every_input_and_numbers_in_input_order() {
            let input_dir = TempDir::new().unwrap();
            let output_dir = TempDir::new().unwrap();
            let a = write_sample_png(input_dir.path(), "a.png", 60, 40);
            let b = write_sample_png(input_dir.path(), "b.png", 40, 60);

            let job = BatchJob::new(
                vec![a.clone(), b.clone()],
                output_dir.path(),
                NormalizeConfig::new(),
            );
            let outcomes = job.run(&SequenceNamer::new("JBY", 1)).unwrap();

            assert_eq!(outcomes.len(), 2);
            assert_eq!(outcomes[0].input, a);
            assert_eq!(outcomes[1].input, b);
            let first = outcomes[0].result.as_ref().unwrap();
            let second = outcomes[1].result.as_ref().unwrap();
            assert_eq!(first.output, output_dir.path().join("JBY00001.jpg"));
            assert_eq!(second.output, output_dir.path().join("JBY00002.jpg"));

            for success in [first, second] {
                let written = std::fs::read(&success.output).unwrap();
                assert_eq!(&written[0..2], &[0xFF, 0xD8]);
                assert_eq!(written.len() as u64, success.size_bytes);
                assert!(success.met_goal);
            }
        }

        #[test]
        fn bad_item_fails_alone_and_the_rest_continue() {
            let input_dir = TempDir::new().unwrap();
            let output_dir = TempDir::new().unwrap();
            let good = write_sample_png(input_dir.path(), "good.png", 32, 32);
            let garbage = input_dir.path().join("garbage.png");
            std::fs::write(&garbage, b"this is not an image at all").unwrap();

            let job = BatchJob::new(
                vec![good, garbage.clone()],
                output_dir.path(),
                NormalizeConfig::new(),
            );
            let outcomes = job.run(&StemNamer).unwrap();

            assert!(outcomes[0].is_success());
            assert!(!outcomes[1].is_success());
            assert_eq!(outcomes[1].input, garbage);
            // The failed item leaves no output file behind.
            assert!(!output_dir.path().join("garbage.jpg").exists());
            assert!(output_dir.path().join("good.jpg").exists());
        }

        #[test]
        fn invalid_config_halts_before_any_processing() {
            let input_dir = TempDir::new().unwrap();
            let output_dir = TempDir::new().unwrap();
            let input = write_sample_png(input_dir.path(), "a.png", 16, 16);

            let mut config = NormalizeConfig::new();
            config.quality_step = 0;
            let job = BatchJob::new(vec![input], output_dir.path(), config);
            let err = job.run(&StemNamer).unwrap_err();
            assert!(err.halts_batch());
            assert!(matches!(err, ListingImageError::InvalidConfig { .. }));
        }

        #[test]
        fn refuses_to_clobber_without_overwrite() {
            let input_dir = TempDir::new().unwrap();
            let output_dir = TempDir::new().unwrap();
            let input = write_sample_png(input_dir.path(), "photo.png", 24, 24);

            let job = BatchJob::new(
                vec![input.clone()],
                output_dir.path(),
                NormalizeConfig::new(),
            );
            let first = job.run(&StemNamer).unwrap();
            assert!(first[0].is_success());

            let second = job.run(&StemNamer).unwrap();
            let err = second[0].result.as_ref().unwrap_err();
            assert!(matches!(err, ListingImageError::FileWriteFailed { .. }));

            let overwriting = BatchJob::new(
                vec![input],
                output_dir.path(),
                NormalizeConfig::new(),
            )
            .overwrite(true);
            let third = overwriting.run(&StemNamer).unwrap();
            assert!(third[0].is_success());
        }

        #[test]
        fn summary_counts_success_failure_and_goal() {
            let input_dir = TempDir::new().unwrap();
            let output_dir = TempDir::new().unwrap();
            let good = write_sample_png(input_dir.path(), "good.png", 32, 32);
            let garbage = input_dir.path().join("bad.png");
            std::fs::write(&garbage, b"nope").unwrap();

            let job = BatchJob::new(
                vec![good, garbage],
                output_dir.path(),
                NormalizeConfig::new(),
            );
            let outcomes = job.run(&StemNamer).unwrap();
            let summary = BatchSummary::from_outcomes(&outcomes);
            assert_eq!(summary.total, 2);
            assert_eq!(summary.succeeded, 1);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.met_goal, 1);
            assert_eq!(summary.relaxed, 0);
            assert_eq!(
                summary.output_bytes,
                outcomes[0].result.as_ref().unwrap().size_bytes
            );
            assert!(!summary.all_succeeded());
        }
    }
}
