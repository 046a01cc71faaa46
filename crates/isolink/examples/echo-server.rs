//! Minimal NAC echo server: accepts one channel and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --example adaptor-client

use std::sync::Arc;

use isolink::channel::{ChannelConfig, ChannelListener, IsoChannel};
use isolink::field::{FieldCodec, Packager};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let packager = Packager::new()
        .with_field(0, FieldCodec::fixed_hex(2, "MTI"))?
        .with_field(11, FieldCodec::fixed_hex(3, "STAN"))?
        .with_field(55, FieldCodec::lll_binary(255, "ICC data")?)?;
    let config = ChannelConfig {
        header: Some("6000010000".to_string()),
        ..ChannelConfig::default()
    };

    let listener = ChannelListener::bind("127.0.0.1:8583", config, Arc::new(packager))?;
    eprintln!("Listening on {}", listener.local_addr());

    let channel = listener.accept()?;
    eprintln!("Channel connected: {}", channel.name());

    loop {
        match channel.receive() {
            Ok(mut msg) => {
                eprintln!("Received {} fields, header {:02X?}", msg.len(), msg.header());
                channel.send(&mut msg)?;
            }
            Err(e) => {
                eprintln!("Channel closed: {e}");
                break;
            }
        }
    }
    Ok(())
}
