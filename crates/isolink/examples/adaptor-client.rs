//! Adaptor client: queues a few network-management requests and prints the
//! replies published on the `out` queue.
//!
//! Start `cargo run --example echo-server` first.

use std::sync::Arc;
use std::time::Duration;

use isolink::adaptor::{AdaptorConfig, AdaptorRegistry, ChannelAdaptor};
use isolink::channel::ChannelConfig;
use isolink::field::{FieldEncoding, FieldSpec, Message};
use isolink::space::Space;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AdaptorConfig::new("demo", "demo-send", "demo-receive");
    config.reconnect_delay = 1_000;
    config.soft_stop = 500;
    config.wait_for_workers_on_stop = true;
    config.channel = ChannelConfig {
        header: Some("6000010000".to_string()),
        ..ChannelConfig::new("127.0.0.1", 8583)
    };
    config.packager.fields = vec![
        FieldSpec::new(0, FieldEncoding::FixedHex, 2),
        FieldSpec::new(11, FieldEncoding::FixedHex, 3),
        FieldSpec::new(55, FieldEncoding::LllBinary, 255),
    ];

    let channel = config.build_channel()?;
    let registry = Arc::new(AdaptorRegistry::new());
    let adaptor = ChannelAdaptor::init(config, Arc::new(channel), Arc::new(Space::new()), registry)?;
    adaptor.start()?;

    for stan in 1..=3u8 {
        adaptor.send(
            Message::new()
                .with_field(0, vec![0x08, 0x00])
                .with_field(11, vec![0x00, 0x00, stan]),
        );
    }

    for _ in 0..3 {
        match adaptor.receive_timeout(Duration::from_secs(10)) {
            Some(reply) => eprintln!("reply: {reply:?}"),
            None => {
                eprintln!("no reply within 10s");
                break;
            }
        }
    }

    eprintln!("{}", adaptor.counters_summary());
    adaptor.destroy();
    Ok(())
}
