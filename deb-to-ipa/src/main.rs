// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    deb_to_ipa::{ConversionError, ConversionEvent, ConversionResult, DebConverter, ScratchArea},
    log::{error, info, warn, LevelFilter},
    std::{
        path::{Path, PathBuf},
        sync::mpsc,
    },
};

/// Messages sent from the conversion thread.
enum WorkerMessage {
    Event(ConversionEvent),
    Finished(PathBuf, Result<ConversionResult, ConversionError>),
}

/// The directory an `.ipa` for a given input is written to.
fn output_dir_for(args: &ArgMatches, input: &Path) -> PathBuf {
    if let Some(dir) = args.value_of("output_dir") {
        PathBuf::from(dir)
    } else {
        match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn scratch_area(args: &ArgMatches) -> Result<ScratchArea, ConversionError> {
    if let Some(dir) = args.value_of("scratch_dir") {
        Ok(ScratchArea::new(dir))
    } else if args.is_present("keep_scratch") {
        // A kept scratch area must outlive the process.
        let path = tempfile::Builder::new()
            .prefix("deb-to-ipa-")
            .tempdir()?
            .into_path();
        info!("scratch area is {}", path.display());
        Ok(ScratchArea::new(path))
    } else {
        ScratchArea::temporary()
    }
}

fn command_convert(args: &ArgMatches) -> Result<(), ConversionError> {
    let inputs = args
        .values_of("input")
        .map(|values| values.map(PathBuf::from).collect::<Vec<_>>())
        .unwrap_or_default();
    let keep_scratch = args.is_present("keep_scratch");
    if keep_scratch && inputs.len() > 1 {
        warn!("intermediate files are only kept for the last input");
    }

    let jobs = inputs
        .iter()
        .map(|input| (input.clone(), output_dir_for(args, input)))
        .collect::<Vec<_>>();

    let mut converter = DebConverter::new(scratch_area(args)?, ".");

    let (tx, rx) = mpsc::channel();

    // Conversions run off the main thread, which only reports progress.
    let worker = std::thread::spawn(move || -> Result<(), ConversionError> {
        for (input, output_dir) in jobs {
            converter.set_output_dir(&output_dir);

            let cb = |event: ConversionEvent| {
                // The receiver only disappears if the main thread is gone.
                let _ = tx.send(WorkerMessage::Event(event));
            };
            let res = converter.convert(&input, Some(&cb));
            let _ = tx.send(WorkerMessage::Finished(input, res));

            if !keep_scratch {
                converter.cleanup()?;
            }
        }

        Ok(())
    });

    let mut failures = 0;

    for message in rx {
        match message {
            WorkerMessage::Event(ConversionEvent::Failed(..)) => {}
            WorkerMessage::Event(event) => {
                info!("{}", event);
            }
            WorkerMessage::Finished(input, Ok(res)) => {
                info!("{} -> {}", input.display(), res.archive_path.display());
                println!("{}", res.archive_path.display());
                println!("  {}", res.descriptor);
            }
            WorkerMessage::Finished(input, Err(e)) => {
                failures += 1;
                error!("converting {} failed: {}", input.display(), e);
                eprintln!("Error: {}", e.user_message());
            }
        }
    }

    worker.join().map_err(|_| {
        ConversionError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "conversion thread panicked",
        ))
    })??;

    if failures > 0 {
        error!("{} of {} conversions failed", failures, inputs.len());
        std::process::exit(1);
    }

    Ok(())
}

fn main_impl() -> Result<(), ConversionError> {
    let app = Command::new("deb2ipa")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Convert iOS application .deb packages to .ipa archives")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("output_dir")
                .long("output-dir")
                .takes_value(true)
                .help("Directory to write .ipa files to (default: directory of each input)"),
        )
        .arg(
            Arg::new("scratch_dir")
                .long("scratch-dir")
                .takes_value(true)
                .help("Directory for intermediate files (default: a temporary directory)"),
        )
        .arg(
            Arg::new("keep_scratch")
                .long("keep-scratch")
                .help(
                    "Do not remove intermediate files after converting. Every conversion \
                    starts by clearing them, so with several inputs only the files of the \
                    last input are kept.",
                ),
        )
        .arg(
            Arg::new("input")
                .required(true)
                .multiple_values(true)
                .help(".deb files to convert"),
        );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    command_convert(&matches)
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err.user_message());
            1
        }
    };

    std::process::exit(exit_code)
}
