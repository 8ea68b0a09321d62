use servofocus::testing::{SimulatedActuator, SimulatedFrameSource, SimulatedLens};
use servofocus::{
    autofocus, init_logging, Actuator, Degrees, FrameSource, Mask,
    SerialActuator, ServofocusConfig, SweepDriver,
};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const USAGE: &str = "Usage: servofocus-cli <sweep|autofocus|move <angle>|config|info> \
[--config <path>] [--json] [--simulate [--best <angle>]] [--camera <index>]";

struct Options {
    config_path: Option<PathBuf>,
    json: bool,
    simulate: bool,
    best_focus: Option<Degrees>,
    camera_index: u32,
    positional: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let options = parse_options(&args[2..])?;
    let command = &args[1];
    match command.as_str() {
        "sweep" => cmd_sweep(&options),
        "autofocus" => cmd_autofocus(&options),
        "move" => cmd_move(&options),
        "config" => cmd_config(&options),
        "info" => cmd_info(&options),
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

fn parse_options(args: &[String]) -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = Options {
        config_path: None,
        json: false,
        simulate: false,
        best_focus: None,
        camera_index: 0,
        positional: Vec::new(),
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                options.config_path = Some(args.get(i).ok_or("--config needs a path")?.into());
            }
            "--best" => {
                i += 1;
                options.best_focus = Some(args.get(i).ok_or("--best needs an angle")?.parse()?);
            }
            "--camera" => {
                i += 1;
                options.camera_index = args.get(i).ok_or("--camera needs an index")?.parse()?;
            }
            "--json" => options.json = true,
            "--simulate" => options.simulate = true,
            other => options.positional.push(other.to_string()),
        }
        i += 1;
    }

    Ok(options)
}

fn load_config(options: &Options) -> Result<ServofocusConfig, Box<dyn std::error::Error>> {
    let config = match &options.config_path {
        Some(path) => ServofocusConfig::load_from_file(path)?,
        None => ServofocusConfig::load_or_default(),
    };
    config.validate()?;
    Ok(config)
}

/// Actuator plus a frame source that sees what it does
fn open_hardware(
    config: &ServofocusConfig,
    options: &Options,
) -> Result<(Arc<dyn Actuator>, Box<dyn FrameSource>), Box<dyn std::error::Error>> {
    if options.simulate {
        let angles = config.angles.sequence()?;
        let best_focus = options
            .best_focus
            .unwrap_or_else(|| angles.get(angles.len() / 2).unwrap_or(angles.first()));
        let actuator = Arc::new(SimulatedActuator::with_range(
            angles.first(),
            config.actuator.min_angle,
            config.actuator.max_angle,
        ));
        let lens = SimulatedLens {
            best_focus,
            depth_of_field: 10.0,
        };
        let source = SimulatedFrameSource::new(actuator.clone(), lens);
        return Ok((actuator, Box::new(source)));
    }

    let actuator = SerialActuator::open(
        &config.actuator.device,
        config.actuator.baud,
        config.actuator.min_angle,
        config.actuator.max_angle,
    )?;
    Ok((Arc::new(actuator), open_camera(options)?))
}

#[cfg(feature = "camera")]
fn open_camera(options: &Options) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    Ok(Box::new(servofocus::source::NokhwaFrameSource::new(
        options.camera_index,
    )))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_options: &Options) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    Err("built without the `camera` feature; use --simulate".into())
}

fn build_driver(
    config: &ServofocusConfig,
    actuator: Arc<dyn Actuator>,
) -> Result<SweepDriver, Box<dyn std::error::Error>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Cancelling sweep...");
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let mut driver = SweepDriver::new(config.sweep.clone(), actuator).with_cancel_flag(cancel);
    if let Some(path) = &config.sweep.mask_path {
        driver = driver.with_mask(Mask::load(path)?);
    }
    Ok(driver)
}

fn cmd_sweep(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(options)?;
    let angles = config.angles.sequence()?;
    let (actuator, mut source) = open_hardware(&config, options)?;
    let driver = build_driver(&config, actuator)?;

    let outcome = driver.run(&angles, source.as_mut())?;

    if options.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        println!(
            "Sweep {} ({:?}, {} ms): {}/{} angles measured",
            outcome.sweep_id,
            outcome.termination,
            outcome.elapsed_ms,
            outcome.filled(),
            outcome.measures.len()
        );
        let normalized = servofocus::normalize(&outcome.measures);
        for ((angle, measure), scaled) in outcome.angles.iter().zip(&outcome.measures).zip(normalized) {
            match (measure, scaled) {
                (Some(m), Some(s)) => println!("{:>4} deg  {:>12.4}  {}", angle, m, bar(s)),
                _ => println!("{:>4} deg  {:>12}", angle, "-"),
            }
        }
    }
    Ok(())
}

fn cmd_autofocus(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(options)?;
    let angles = config.angles.sequence()?;
    let (actuator, mut source) = open_hardware(&config, options)?;
    let driver = build_driver(&config, actuator)?;

    let result = autofocus(&driver, &angles, source.as_mut(), &config.autofocus)?;

    if options.json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!(
            "Focused at {} degrees (score {:.4}, {}/{} angles measured)",
            result.peak.angle,
            result.peak.score,
            result.outcome.filled(),
            result.outcome.measures.len()
        );
    }
    Ok(())
}

fn cmd_move(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let angle: Degrees = options
        .positional
        .first()
        .ok_or("Usage: servofocus-cli move <angle>")?
        .parse()?;
    let config = load_config(options)?;

    if options.simulate {
        let actuator = SimulatedActuator::with_range(
            angle,
            config.actuator.min_angle,
            config.actuator.max_angle,
        );
        actuator.move_to(angle)?;
    } else {
        let actuator = SerialActuator::open(
            &config.actuator.device,
            config.actuator.baud,
            config.actuator.min_angle,
            config.actuator.max_angle,
        )?;
        actuator.move_to(angle)?;
    }

    if options.json {
        println!("{}", serde_json::json!({ "angle": angle }));
    } else {
        println!("Moved to {} degrees", angle);
    }
    Ok(())
}

fn cmd_config(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &options.config_path {
        Some(path) => ServofocusConfig::load_from_file(path)?,
        None => ServofocusConfig::default(),
    };
    if options.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn cmd_info(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let info = servofocus::get_info();
    if options.json {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{} {}", info.name, info.version);
        println!("camera support: {}", info.camera_support);
        println!("focus metric: {}", info.default_metric);
    }
    Ok(())
}

fn bar(scaled: f64) -> String {
    "#".repeat((scaled * 40.0).round() as usize)
}
