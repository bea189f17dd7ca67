use anyhow::Context;
use clap::Parser;
use crossbeam_channel::bounded;
use sweep_slurper::{
    args::{convert_filter, Args},
    capture::{spawn_capture, SweepProducer},
    exfil::FanoutExchange,
    SweepDriver,
};
use tracing::info;

// How many raw records can sit between the capture and processing threads
const LINE_CAPACITY: usize = 4096;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let sweep = args.sweep_config().validate()?;
    let settings = args.driver_config();
    info!(?sweep, "Starting sweep slurper");

    // Transport first, there's no point sweeping if nobody can hear us
    let exchange = FanoutExchange::bind(
        &settings.publish_addr,
        &settings.exchange,
        settings.publish_backlog,
    )?;
    let (producer, stdout) = SweepProducer::spawn(&sweep, &settings.sweep_binary)?;

    let (line_sender, line_receiver) = bounded(LINE_CAPACITY);
    spawn_capture(stdout, line_sender).context("spawning capture thread")?;

    let (stop_sender, stop_receiver) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_sender.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    let mut driver = SweepDriver::new(
        &sweep,
        producer,
        exchange,
        line_receiver,
        stop_receiver,
        settings.read_timeout,
    );
    driver.run()?;
    Ok(())
}
