use clap::{Arg, Command};
use log::info;
use std::path::PathBuf;
use std::{panic, process};

use crate::config::{PipelineConfig, app_name, app_version};
use crate::pipeline::PipelineCoordinator;
use crate::resample::PcmResampler;
use crate::sink::{CountingSink, FileDumpSink, OutputSink};
use crate::source::synthetic::{SyntheticAudioSource, SyntheticVideoSource};
use crate::utils::sos::SignalOfStop;

pub mod config;
pub mod pipeline;
pub mod resample;
pub mod sink;
pub mod source;
pub mod utils;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let app_name = Box::leak(app_name().into_boxed_str());

    let matches = Command::new(&*app_name)
        .version(app_version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("Dump the merged stream to this file instead of counting frames.")
                .required(false),
        )
        .arg(
            Arg::new("device")
                .short('d')
                .long("device")
                .value_name("DEVICE")
                .help("Capture device identifier (informational with synthetic sources).")
                .required(false),
        )
        .get_matches();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    config::init();

    let pipeline_config = PipelineConfig::default();
    if let Some(device) = matches.get_one::<String>("device") {
        info!("capture device: {}", device);
    }

    let sink: Box<dyn OutputSink> = match matches.get_one::<String>("output") {
        Some(path) => Box::new(FileDumpSink::create(&PathBuf::from(path))?),
        None => Box::new(CountingSink::new()),
    };

    let video_source = Box::new(SyntheticVideoSource::new(
        pipeline_config.video.width,
        pipeline_config.video.height,
        pipeline_config.video.fps_out,
        pipeline_config.video.tick_rate,
    ));
    let audio_source = Box::new(SyntheticAudioSource::new(
        pipeline_config.audio.sample_rate,
        pipeline_config.audio.channels,
    ));

    let mut coordinator = PipelineCoordinator::launch(
        pipeline_config,
        video_source,
        audio_source,
        Box::new(PcmResampler::new()),
        sink,
    )?;
    let health = coordinator.health();

    // gracefully close the pipeline when receiving SIGINT, SIGTERM, or SIGHUP
    let sos = SignalOfStop::new();
    let handler_sos = sos.clone();
    ctrlc::set_handler(move || {
        handler_sos.cancel();
    })
    .expect("Error setting Ctrl-C handler");

    info!("{} {}: running, interrupt to stop", config::app_name(), app_version());
    sos.wait_cancellation();

    eprintln!("interrupted. closing...");
    coordinator.close();
    println!("{}", health.summary());
    Ok(())
}
