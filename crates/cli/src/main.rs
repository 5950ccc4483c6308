use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use facelapse_core::alignment::infrastructure::bilinear_warper::BilinearWarper;
use facelapse_core::config::settings::{
    config_paths, load_layers, AlignSettings, Command, ConfigLayer, FramedropSettings,
    LandmarkSource,
};
use facelapse_core::detection::domain::landmark_detector::{
    LandmarkDetector, LandmarkDetectorFactory,
};
use facelapse_core::detection::infrastructure::json_landmark_detector::{
    JsonLandmarkDetector, LandmarkTable,
};
use facelapse_core::detection::infrastructure::onnx_yolo_landmark_detector::OnnxYoloLandmarkDetector;
use facelapse_core::io::infrastructure::file_list::write_file_list;
use facelapse_core::io::infrastructure::image_file_reader::ImageFileReader;
use facelapse_core::io::infrastructure::image_file_writer::ImageFileWriter;
use facelapse_core::io::infrastructure::input_files::{
    aligned_files, expand_glob, prepare_output_dir,
};
use facelapse_core::pipeline::align_executor::AlignConfig;
use facelapse_core::pipeline::align_frames_use_case::AlignFramesUseCase;
use facelapse_core::pipeline::infrastructure::threaded_align_executor::ThreadedAlignExecutor;
use facelapse_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facelapse_core::pipeline::select_frames_use_case::{MaskSource, SelectFramesUseCase};
use facelapse_core::shared::constants::{CONFIG_FILE_NAME, YOLO_MODEL_NAME, YOLO_MODEL_URL};
use facelapse_core::shared::model_resolver;

/// Align portrait photos and pick a smooth subset for a time-lapse.
///
/// Settings are read from the user config file, the system config file,
/// then `--config`, then the command line; later sources win.
#[derive(Parser)]
#[command(name = "facelapse")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Config file read after the user and system config files.
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Directory for aligned images.
    #[arg(long, global = true)]
    aligned_path: Option<PathBuf>,

    /// Face landmark model (ONNX). Downloaded on first use when omitted.
    #[arg(long, global = true)]
    predictor_path: Option<PathBuf>,

    /// JSON file of precomputed landmarks; replaces the model.
    #[arg(long, global = true)]
    landmarks_file: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0].
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// Extension (and format) of aligned images.
    #[arg(long, global = true)]
    out_extension: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop near-duplicates, then align and color-correct every photo.
    Align {
        /// Input images, e.g. "photos/*.jpg". Sorted by path.
        #[arg(long)]
        input_glob: Option<String>,

        /// Pixel L2 distance at or below which a photo counts as a duplicate.
        #[arg(long)]
        img_thresh: Option<f64>,

        /// Detection worker threads.
        #[arg(long)]
        workers: Option<usize>,

        /// Fixed reference face color instead of the first photo's.
        #[arg(long, num_args = 3, value_names = ["R", "G", "B"])]
        ref_color: Option<Vec<f64>>,
    },
    /// Keep one aligned image per group of frames, minimizing face flicker.
    Framedrop {
        /// Group size: one frame is kept per group.
        #[arg(long)]
        frame_skip: Option<usize>,

        /// Gaussian kernel size used to shrink the face mask (odd).
        #[arg(long)]
        erode_amount: Option<usize>,

        /// Output list of retained image paths.
        #[arg(long)]
        filtered_files: Option<PathBuf>,
    },
    /// Print the config files that are read, in order.
    PrintConfigPaths,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let paths = config_paths(&cli.config);
    let overrides = cli_layer(&cli);

    match cli.command {
        Commands::PrintConfigPaths => {
            for path in &paths {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Align { .. } => {
            let mut layer = load_layers(&paths, Command::Align)?;
            layer.overlay(overrides);
            let settings = AlignSettings::from_layer(&layer)?;
            log::debug!("{settings:?}");
            run_align(settings)
        }
        Commands::Framedrop { .. } => {
            let mut layer = load_layers(&paths, Command::Framedrop)?;
            layer.overlay(overrides);
            let settings = FramedropSettings::from_layer(&layer)?;
            log::debug!("{settings:?}");
            run_framedrop(settings)
        }
    }
}

/// Settings given on the command line, as the last config layer.
fn cli_layer(cli: &Cli) -> ConfigLayer {
    let mut layer = ConfigLayer {
        aligned_path: cli.aligned_path.clone(),
        predictor_path: cli.predictor_path.clone(),
        landmarks_file: cli.landmarks_file.clone(),
        confidence: cli.confidence,
        out_extension: cli.out_extension.clone(),
        ..ConfigLayer::default()
    };
    match &cli.command {
        Commands::Align {
            input_glob,
            img_thresh,
            workers,
            ref_color,
        } => {
            layer.input_glob = input_glob.clone();
            layer.img_thresh = *img_thresh;
            layer.workers = *workers;
            layer.ref_color = ref_color.as_ref().map(|c| [c[0], c[1], c[2]]);
        }
        Commands::Framedrop {
            frame_skip,
            erode_amount,
            filtered_files,
        } => {
            layer.frame_skip = *frame_skip;
            layer.erode_amount = *erode_amount;
            layer.filtered_files = filtered_files.clone();
        }
        Commands::PrintConfigPaths => {}
    }
    layer
}

fn run_align(settings: AlignSettings) -> Result<(), Box<dyn std::error::Error>> {
    let inputs = expand_glob(&settings.input_glob)?;
    if inputs.is_empty() {
        return Err(format!("No images match {}", settings.input_glob).into());
    }
    log::info!("Found {} images matching {}", inputs.len(), settings.input_glob);

    let factory = detector_factory(&settings.landmarks)?;
    prepare_output_dir(&settings.aligned_path, &settings.out_extension)?;

    let config = AlignConfig {
        img_thresh: settings.img_thresh,
        ref_color: settings.ref_color.map(|c| c.to_vec()),
        output_dir: settings.aligned_path.clone(),
        out_extension: settings.out_extension.clone(),
    };
    let mut use_case = AlignFramesUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(ImageFileWriter::new()),
        factory,
        Box::new(BilinearWarper::new()),
        Box::new(ThreadedAlignExecutor::new()),
        Box::new(StdoutPipelineLogger::default()),
    );
    use_case.execute(inputs, &config, settings.workers)?;
    log::info!("Output written to {}", settings.aligned_path.display());
    Ok(())
}

fn run_framedrop(settings: FramedropSettings) -> Result<(), Box<dyn std::error::Error>> {
    let files = aligned_files(&settings.aligned_path, &settings.out_extension)?;
    log::info!(
        "Found {} aligned images in {}",
        files.len(),
        settings.aligned_path.display()
    );

    let mask_source = match &settings.landmarks {
        // Precomputed landmarks are keyed by the original photo names.
        LandmarkSource::File(_) => MaskSource::saved(&settings.aligned_path)?,
        LandmarkSource::Model { .. } => {
            let factory = detector_factory(&settings.landmarks)?;
            MaskSource::Detect(factory().map_err(|e| e.to_string())?)
        }
    };
    let mut use_case = SelectFramesUseCase::new(
        Box::new(ImageFileReader::new()),
        mask_source,
        Box::new(StdoutPipelineLogger::default()),
    );
    let kept = use_case.execute(&files, settings.frame_skip, settings.erode_amount)?;
    write_file_list(&settings.filtered_files, &kept)?;
    Ok(())
}

fn detector_factory(
    source: &LandmarkSource,
) -> Result<LandmarkDetectorFactory, Box<dyn std::error::Error>> {
    match source {
        LandmarkSource::File(path) => {
            let table = Arc::new(LandmarkTable::load(path)?);
            log::info!(
                "Loaded landmarks for {} images from {}",
                table.len(),
                path.display()
            );
            let factory: LandmarkDetectorFactory = Box::new(move || {
                Ok(Box::new(JsonLandmarkDetector::new(table.clone())) as Box<dyn LandmarkDetector>)
            });
            Ok(factory)
        }
        LandmarkSource::Model { path, confidence } => {
            log::info!("Resolving model: {YOLO_MODEL_NAME}");
            let model_path = model_resolver::resolve(
                path.as_deref(),
                YOLO_MODEL_NAME,
                YOLO_MODEL_URL,
                Some(Box::new(download_progress)),
            )?;
            if path.is_none() {
                eprintln!();
            }
            log::info!("Using model {}", model_path.display());

            let confidence = *confidence;
            let factory: LandmarkDetectorFactory = Box::new(move || {
                let detector = OnnxYoloLandmarkDetector::new(&model_path, confidence)?;
                Ok(Box::new(detector) as Box<dyn LandmarkDetector>)
            });
            Ok(factory)
        }
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face landmark model... {pct}%");
    } else {
        eprint!("\rDownloading face landmark model... {downloaded} bytes");
    }
}
