use std::sync::Arc;
use std::thread;

use isolink_channel::{ChannelConfig, ChannelError, ChannelListener, IsoChannel, NacChannel};
use isolink_field::Packager;

use crate::cmd::EchoArgs;
use crate::exit::{channel_error, field_error, CliError, CliResult, INTERNAL, SUCCESS};

enum RecvErrorDisposition {
    /// End the session.
    Break,
    /// Drop the frame and keep reading.
    Skip,
}

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let packager =
        Packager::from_file(&args.config).map_err(|err| field_error("packager load failed", err))?;
    let config = ChannelConfig {
        header: args.header.clone(),
        tpdu_swap: !args.no_swap,
        ..ChannelConfig::default()
    };
    let listener = ChannelListener::bind(&args.addr, config, Arc::new(packager))
        .map_err(|err| channel_error("bind failed", err))?;
    tracing::info!(addr = %listener.local_addr(), "echo server listening");

    install_ctrlc_handler()?;

    let mut sessions = Vec::new();
    loop {
        if args.sessions.is_some_and(|limit| sessions.len() >= limit) {
            break;
        }
        let channel = listener
            .accept()
            .map_err(|err| channel_error("accept failed", err))?;
        let name = channel.name().to_string();
        let handle = thread::Builder::new()
            .name(format!("echo-{name}"))
            .spawn(move || serve(&channel))
            .map_err(|err| CliError::new(INTERNAL, format!("session thread failed: {err}")))?;
        sessions.push(handle);
    }

    for handle in sessions {
        let _ = handle.join();
    }
    Ok(SUCCESS)
}

/// Echo messages until the peer goes away. Returns the number echoed.
fn serve(channel: &NacChannel) -> usize {
    tracing::info!(session = channel.name(), "session opened");
    let mut echoed = 0;
    loop {
        let mut msg = match channel.receive() {
            Ok(msg) => msg,
            Err(err) => match classify_recv_error(&err) {
                RecvErrorDisposition::Skip => {
                    tracing::warn!(session = channel.name(), error = %err, "dropping frame");
                    continue;
                }
                RecvErrorDisposition::Break => {
                    tracing::debug!(session = channel.name(), error = %err, "session ended");
                    break;
                }
            },
        };

        tracing::info!(
            session = channel.name(),
            fields = msg.len(),
            "echoing message"
        );
        if let Err(err) = channel.send(&mut msg) {
            tracing::warn!(session = channel.name(), error = %err, "echo send failed");
            break;
        }
        echoed += 1;
    }
    let _ = channel.disconnect();
    tracing::info!(session = channel.name(), echoed, "session closed");
    echoed
}

fn install_ctrlc_handler() -> CliResult<()> {
    // Sessions carry no state worth flushing.
    ctrlc::set_handler(|| std::process::exit(SUCCESS)).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

fn classify_recv_error(err: &ChannelError) -> RecvErrorDisposition {
    // An unpack failure has already consumed its frame; anything else may
    // leave the stream mid-frame.
    match err {
        ChannelError::Unpack(_) | ChannelError::Veto(_) => RecvErrorDisposition::Skip,
        _ => RecvErrorDisposition::Break,
    }
}
