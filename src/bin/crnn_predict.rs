use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use crnn_ocr_rs::{
    aggregate_reports, compute_sample_reports, sample_instances, CrnnConfig, CrnnModelConfig,
    CsvResultSink, DatasetLoader, DecodeStrategy, DirectoryLoader, DirectorySplit, Meta,
    MjsynthLoader, Prediction, Recognizer, RecognizerBuilder, ResultSink, Sample,
    ValidationReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

const MJSYNTH_MAX_LABEL_LEN: usize = 23;
const DEFAULT_MAX_LABEL_LEN: usize = 21;
const EXAMPLE_COUNT: usize = 10;
const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DecoderChoice {
    Greedy,
    Beam,
}

#[derive(Debug, Parser)]
#[command(name = "crnn_predict")]
#[command(about = "Batch CRNN text recognition with optional edit-distance validation")]
struct Args {
    /// Directory holding model.onnx and optionally config.json / lexicon.txt.
    #[arg(long, env = "CRNN_PREDICT_MODEL_DIR")]
    model_dir: PathBuf,
    #[arg(long, env = "CRNN_PREDICT_IMAGE_PATH")]
    image_path: PathBuf,
    /// Directory that receives prediction.csv.
    #[arg(long, env = "CRNN_PREDICT_RESULT_PATH")]
    result_path: Option<PathBuf>,
    /// mjsynth annotation file, relative to --image-path.
    #[arg(long, env = "CRNN_PREDICT_VAL_FNAME")]
    val_fname: Option<PathBuf>,
    #[arg(long, env = "CRNN_PREDICT_NUM_INSTANCES")]
    num_instances: Option<usize>,
    #[arg(long, env = "CRNN_PREDICT_DEVICE", default_value = "cpu")]
    device: String,
    #[arg(
        long,
        env = "CRNN_PREDICT_BATCH_SIZE",
        default_value_t = CrnnConfig::DEFAULT_BATCH_SIZE
    )]
    batch_size: usize,
    #[arg(long, env = "CRNN_PREDICT_RANDOM_STATE", default_value_t = 42)]
    random_state: u64,
    #[arg(long, env = "CRNN_PREDICT_VALIDATE", default_value_t = false)]
    validate: bool,
    #[arg(long, env = "CRNN_PREDICT_MJSYNTH", default_value_t = false)]
    mjsynth: bool,
    #[arg(long, env = "CRNN_PREDICT_IMG_HEIGHT")]
    img_height: Option<usize>,
    #[arg(long, env = "CRNN_PREDICT_IMG_WIDTH")]
    img_width: Option<usize>,
    /// Defaults to 23 with --mjsynth, 21 otherwise.
    #[arg(long, env = "CRNN_PREDICT_MAX_LABEL_LEN")]
    max_label_len: Option<usize>,
    #[arg(
        long,
        env = "CRNN_PREDICT_DECODER",
        value_enum,
        default_value_t = DecoderChoice::Beam
    )]
    decoder: DecoderChoice,
    #[arg(
        long,
        env = "CRNN_PREDICT_BEAM_WIDTH",
        default_value_t = DecodeStrategy::DEFAULT_BEAM_WIDTH
    )]
    beam_width: usize,
    /// Writes a JSON validation report; requires --validate.
    #[arg(long, env = "CRNN_PREDICT_REPORT_OUT")]
    report_out: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    if args.report_out.is_some() && !args.validate {
        return Err("--report-out requires --validate.".to_string());
    }
    if args.beam_width == 0 {
        return Err("--beam-width must be >= 1.".to_string());
    }
    require_path_exists(&args.image_path, "Missing image directory.")?;

    let config = build_config(&args)?;
    let model_path = config.model_path.clone();
    let recognizer = RecognizerBuilder::new(config)
        .build()
        .map_err(|err| format!("Failed to build Recognizer: {err}"))?;

    let mut samples = load_samples(&args)?;
    if let Some(n) = args.num_instances {
        samples = sample_instances(samples, n, args.random_state);
    }

    let truths = if args.validate {
        let total = samples.len();
        let (labelled, truths) = recognizer.labelled_samples(samples);
        if labelled.len() < total {
            tracing::warn!(
                skipped = total - labelled.len(),
                "samples without a usable label were dropped"
            );
        }
        samples = labelled;
        Some(truths)
    } else {
        None
    };
    if samples.is_empty() {
        return Err(format!(
            "No images found under '{}'.",
            args.image_path.display()
        ));
    }

    let mut sink = match args.result_path.as_deref() {
        Some(dir) => {
            let (sink, path) = CsvResultSink::create_in_dir(dir)
                .map_err(|err| format!("Failed to open result file: {err}"))?;
            Some((sink, path))
        }
        None => None,
    };

    println!(" [INFO] Computing predictions for {} images...", samples.len());
    let started = Instant::now();
    let predictions = predict_with_progress(&recognizer, &samples, sink.as_mut().map(|(s, _)| s))?;
    println!(
        " [INFO] {} images processed in {:.2} sec.",
        predictions.len(),
        started.elapsed().as_secs_f64()
    );

    if let Some((_, path)) = &sink {
        let examples: Vec<&str> = predictions
            .iter()
            .take(EXAMPLE_COUNT)
            .map(|p| p.text.as_str())
            .collect();
        println!(" [INFO] Prediction example: {examples:?}");
        println!(" [INFO] Result stored in: {}", path.display());
    }

    if let Some(truths) = truths {
        validate(&args, &recognizer, &model_path, &predictions, &truths)?;
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<CrnnConfig, String> {
    let model_path = args.model_dir.join("model.onnx");
    if !cfg!(feature = "onnx") {
        return Err(
            "this binary was built without ONNX support. Rebuild with `--features \"predict-cli,onnx\"`."
                .to_string(),
        );
    }
    require_path_exists(&model_path, "Missing model weights (model.onnx).")?;
    let config_path = optional_file(&args.model_dir.join("config.json"));
    let lexicon_path = optional_file(&args.model_dir.join("lexicon.txt"));

    let image_size = match (args.img_height, args.img_width) {
        (None, None) => None,
        (height, width) => {
            let base = CrnnModelConfig::load(Path::new(&config_path))
                .map_err(|err| format!("Failed to read model config: {err}"))?;
            Some((
                height.unwrap_or(base.img_height),
                width.unwrap_or(base.img_width),
            ))
        }
    };
    let decode = match args.decoder {
        DecoderChoice::Greedy => DecodeStrategy::Greedy,
        DecoderChoice::Beam => DecodeStrategy::Beam {
            beam_width: args.beam_width,
            top_paths: 1,
        },
    };
    let max_label_len = args.max_label_len.unwrap_or(if args.mjsynth {
        MJSYNTH_MAX_LABEL_LEN
    } else {
        DEFAULT_MAX_LABEL_LEN
    });

    Ok(CrnnConfig {
        model_path: model_path.to_string_lossy().into_owned(),
        config_path,
        lexicon_path,
        device: args.device.clone(),
        batch_size: args.batch_size,
        max_label_len: Some(max_label_len),
        image_size,
        decode,
    })
}

fn load_samples(args: &Args) -> Result<Vec<Sample>, String> {
    let loader: Box<dyn DatasetLoader> = match (args.validate, args.mjsynth) {
        (true, true) => {
            let val_fname = args
                .val_fname
                .as_ref()
                .ok_or_else(|| "--validate --mjsynth requires --val-fname.".to_string())?;
            Box::new(MjsynthLoader::new(&args.image_path, val_fname))
        }
        (true, false) => Box::new(DirectoryLoader::new(
            &args.image_path,
            DirectorySplit::Validation {
                seed: args.random_state,
            },
        )),
        (false, _) => Box::new(DirectoryLoader::new(&args.image_path, DirectorySplit::All)),
    };
    loader
        .load_samples()
        .map_err(|err| format!("Failed to load samples: {err}"))
}

fn predict_with_progress(
    recognizer: &Recognizer,
    samples: &[Sample],
    mut sink: Option<&mut CsvResultSink<std::fs::File>>,
) -> Result<Vec<Prediction>, String> {
    let progress = ProgressBar::new(samples.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message(recognizer.decoder_name());

    let predictions = recognizer
        .predict_samples(samples, |batch| {
            if let Some(sink) = sink.as_deref_mut() {
                sink.write_predictions(batch)?;
            }
            progress.inc(batch.len() as u64);
            Ok(())
        })
        .map_err(|err| format!("Prediction failed: {err}"))?;
    progress.finish_with_message("done");
    Ok(predictions)
}

fn validate(
    args: &Args,
    recognizer: &Recognizer,
    model_path: &str,
    predictions: &[Prediction],
    truths: &[String],
) -> Result<(), String> {
    let started = Instant::now();
    let pairs: Vec<(&str, &str)> = predictions
        .iter()
        .zip(truths)
        .take(EXAMPLE_COUNT)
        .map(|(p, t)| (p.text.as_str(), t.as_str()))
        .collect();
    println!(" [INFO] Example pairs (predicted, true): {pairs:?}");

    let scores = recognizer
        .validate(predictions, truths)
        .map_err(|err| format!("Validation failed: {err}"))?;
    println!(
        " [INFO] edit distances calculated in {:.2} sec.",
        started.elapsed().as_secs_f64()
    );
    println!(
        " [INFO] mean edit distance: {:.6} ; normalized edit distance score: {:.6}",
        scores.mean_edit_distance.unwrap_or(0.0),
        scores.mean_normalized_edit_distance.unwrap_or(0.0)
    );
    if let (Some(exact), Some(cer)) = (scores.exact_match_ratio, scores.character_error_rate) {
        println!(" [INFO] exact match ratio: {exact:.4} ; character error rate: {cer:.4}");
    }

    if let Some(out) = &args.report_out {
        let meta = Meta {
            generated_at: Utc::now().to_rfc3339(),
            model_path: model_path.to_string(),
            device: recognizer.device_label(),
            decoder: recognizer.decoder_name().to_string(),
            sample_count: predictions.len(),
        };
        let report = validation_report(meta, predictions, truths)?;
        write_validation_report(out, &report)?;
        println!("{}", out.display());
    }
    Ok(())
}

fn validation_report(
    meta: Meta,
    predictions: &[Prediction],
    truths: &[String],
) -> Result<ValidationReport, String> {
    let samples = compute_sample_reports(predictions, truths)
        .map_err(|err| format!("Failed to build sample reports: {err}"))?;
    Ok(ValidationReport {
        schema_version: REPORT_SCHEMA_VERSION,
        meta,
        aggregates: aggregate_reports(&samples),
        samples,
    })
}

/// Writes the report as pretty JSON, creating missing parent directories.
fn write_validation_report(out: &Path, report: &ValidationReport) -> Result<(), String> {
    tracing::debug!(
        samples = report.meta.sample_count,
        outliers = report.aggregates.outliers.len(),
        path = %out.display(),
        "writing validation report"
    );
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create '{}': {err}", parent.display()))?;
    }
    let file = File::create(out)
        .map_err(|err| format!("Failed to create report '{}': {err}", out.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|err| format!("Failed to write report '{}': {err}", out.display()))?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .map_err(|err| format!("Failed to write report '{}': {err}", out.display()))
}

fn optional_file(path: &Path) -> String {
    if path.is_file() {
        path.to_string_lossy().into_owned()
    } else {
        String::new()
    }
}

fn require_path_exists(path: &Path, message: &str) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    Err(format!("{message} Missing path: {}", path.display()))
}
