use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use isolink_adaptor::{AdaptorConfig, AdaptorRegistry, ChannelAdaptor};
use isolink_space::Space;

use crate::cmd::RunArgs;
use crate::exit::{adaptor_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{parse_message_line, print_message, print_stats, OutputFormat};

/// How long the main loop waits for a received message before rechecking
/// the stop flag.
const RECEIVE_POLL: Duration = Duration::from_millis(200);

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = AdaptorConfig::from_file(&args.config)
        .map_err(|err| adaptor_error("config load failed", err))?;
    let channel = config
        .build_channel()
        .map_err(|err| adaptor_error("channel setup failed", err))?;
    let adaptor = ChannelAdaptor::init(
        config,
        Arc::new(channel),
        Arc::new(Space::new()),
        Arc::new(AdaptorRegistry::new()),
    )
    .map_err(|err| adaptor_error("adaptor init failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    adaptor
        .start()
        .map_err(|err| adaptor_error("adaptor start failed", err))?;
    let input_done = Arc::new(AtomicBool::new(false));
    spawn_feeder(
        Arc::clone(&adaptor),
        args.input.clone(),
        Arc::clone(&input_done),
    )?;

    let mut received = 0usize;
    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|limit| received >= limit) {
            break;
        }
        if adaptor.output_key().is_none() {
            // Write-only: done once the input is exhausted and sent.
            if input_done.load(Ordering::SeqCst) && adaptor.pending() == 0 {
                break;
            }
            thread::sleep(RECEIVE_POLL);
            continue;
        }
        if let Some(msg) = adaptor.receive_timeout(RECEIVE_POLL) {
            print_message(&msg, adaptor.name(), format);
            received += 1;
        }
    }

    adaptor.stop();
    adaptor.wait_for_workers(adaptor.config().soft_stop().max(Duration::from_secs(1)));
    tracing::info!(adaptor = %adaptor.name(), counters = %adaptor.counters_summary(), "adaptor stopped");
    print_stats(&adaptor.stats(), format);
    adaptor.destroy();
    Ok(SUCCESS)
}

/// Feed message lines from `input` (or stdin) into the adaptor's `in` queue.
fn spawn_feeder(
    adaptor: Arc<ChannelAdaptor>,
    input: Option<PathBuf>,
    done: Arc<AtomicBool>,
) -> CliResult<()> {
    let reader: Box<dyn BufRead + Send> = match &input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    thread::Builder::new()
        .name("input-feeder".to_string())
        .spawn(move || {
            let fed = feed(reader, &adaptor);
            tracing::debug!(fed, "input exhausted");
            done.store(true, Ordering::SeqCst);
        })
        .map(|_| ())
        .map_err(|err| CliError::new(INTERNAL, format!("input thread failed: {err}")))
}

/// Queue every parsable line. Returns the number of messages queued.
fn feed(reader: impl BufRead, adaptor: &ChannelAdaptor) -> usize {
    let mut fed = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "input read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_message_line(&line) {
            Ok(msg) => {
                adaptor.send(msg);
                fed += 1;
            }
            Err(err) => tracing::warn!(line = index + 1, error = %err, "skipping input line"),
        }
    }
    fed
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
