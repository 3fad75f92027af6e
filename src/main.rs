use clap::Parser;
use dialoguer::{Select, theme::ColorfulTheme};
use soundmeter::app::{self, ExitCode, FileTick};
use soundmeter::config::{self, Args, Commands, PipelineConfig};
use soundmeter::logging::{self, LogTarget};
use soundmeter::{MeterResult, audio, file};

fn list_devices() -> MeterResult<()> {
    let device_list = audio::list_input_devices()?;

    if device_list.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    // Interactive selection
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select an audio input device")
        .items(&device_list)
        .default(0)
        .interact()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    println!("{}", device_list[selection]);

    Ok(())
}

fn format_level(level_db: Option<f32>) -> String {
    match level_db {
        Some(db) => format!("{:.2} dB", db),
        None => "silent (-inf dB)".to_string(),
    }
}

fn print_tick(tick: FileTick) {
    println!(
        "{:>9.2}s  dB: {:>7.1}  avg: {:>7.1}  max: {:>7.1}",
        tick.at_secs, tick.reading.value, tick.reading.average, tick.reading.peak
    );
}

fn app_or_exit(pipeline: &config::PipelineArgs) -> app::App {
    let app = PipelineConfig::from_args(pipeline).and_then(app::App::new_with_config);
    match app {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(ExitCode::Error as i32);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Commands::Live(live_args) => {
            logging::init_tracing(LogTarget::File);
            let app = app_or_exit(&live_args.pipeline);

            let run_result = app.run_live(live_args.device, live_args.label_shift).await;
            match run_result.result {
                Ok(_) => {
                    std::process::exit(run_result.exit_code as i32);
                }
                Err(e) => {
                    eprintln!("Application error: {}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            }
        }
        Commands::File(file_args) => {
            logging::init_tracing(LogTarget::Stderr);
            let app = app_or_exit(&file_args.pipeline);

            let source = match file::FileSource::open(&file_args.path) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            };

            let summary = source.summary();
            println!("File: {}", summary.info.name);
            println!("Duration: {:.2} seconds", summary.duration_secs);
            println!("Sample Rate: {} Hz", summary.info.sample_rate);
            println!("Channels: {}", summary.info.channels);
            println!("Sound Level: {}", format_level(summary.level_db));

            let timeline = file_args.timeline;
            let result = app
                .run_file(source, file_args.realtime, |tick| {
                    if timeline {
                        print_tick(tick);
                    }
                })
                .await;

            match result {
                Ok(reading) => {
                    println!("Average: {:.1} dB", reading.average);
                    println!("Max: {:.1} dB", reading.peak);
                }
                Err(e) => {
                    eprintln!("Error during metering: {}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            }
        }
        Commands::Measure(measure_args) => {
            logging::init_tracing(LogTarget::Stderr);
            let duration = match config::validate_seconds(measure_args.seconds) {
                Ok(duration) => duration,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            };
            let app = app_or_exit(&measure_args.pipeline);

            match app.run_measure(measure_args.device, duration).await {
                Ok(reading) => {
                    if measure_args.quiet {
                        println!("{}", reading.average.round() as i32);
                        println!("{}", reading.peak.round() as i32);
                    } else {
                        println!("Average: {:.1} dB", reading.average);
                        println!("Max: {:.1} dB", reading.peak);
                    }
                }
                Err(e) => {
                    eprintln!("Error during monitoring: {}", e);
                    std::process::exit(ExitCode::Error as i32);
                }
            }
        }
        Commands::List(_) => {
            logging::init_tracing(LogTarget::Stderr);
            if let Err(e) = list_devices() {
                eprintln!("Error listing devices: {}", e);
                std::process::exit(ExitCode::Error as i32);
            }
        }
    }

    std::process::exit(ExitCode::Success as i32);
}
