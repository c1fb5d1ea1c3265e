use std::sync::Arc;
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use osc1lite::{
    Configuration, Controller, CustomWave, Event, SimulatedTransport, SquareWave, TriggerSource,
    Waveform,
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn wait_for(events: &Receiver<Event>, wanted: impl Fn(&Event) -> bool) -> Option<Event> {
    while let Ok(event) = events.recv_timeout(TIMEOUT) {
        log::info!("event: {:?}", event);
        if wanted(&event) {
            return Some(event)
        }
    }
    None
}

fn main() -> osc1lite::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let waveform = match std::env::args().nth(1) {
        Some(path) => match CustomWave::from_file(&path) {
            Ok(wave) => Waveform::Custom(wave),
            Err(error) => {
                log::error!("{}: {}", path, error);
                std::process::exit(1)
            }
        },
        None => Waveform::Square(SquareWave::from_rise_time(1000.0, 0.005, 0.05, 0.1)),
    };

    let sim = Arc::new(SimulatedTransport::with_devices(&[("OSC1Lite", "DEMO0001")]));
    let (event_send, event_recv) = channel();
    let mut controller = Controller::new(Arc::clone(&sim), Configuration {
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    }, event_send);

    let serial = match wait_for(&event_recv, |event| matches!(event, Event::DeviceListChanged(_))) {
        Some(Event::DeviceListChanged(devices)) => match devices.select(None) {
            Some(serial) => serial.to_owned(),
            None => {
                log::error!("no devices attached");
                return Ok(())
            }
        },
        _ => {
            log::error!("discovery did not report any devices");
            return Ok(())
        }
    };
    controller.connect(&serial)?;

    controller.set_slot(1, waveform.clone(), 5)?;
    controller.select_waveform(0, 1)?;
    controller.trigger(0)?;
    if let Some(written) = sim.channel(0) {
        log::info!("channel 0 holds {:?}", written.decode()?);
    }
    for (time, current) in waveform.preview(5, 0.25).iter().take(8) {
        log::info!("preview: {:.4} s, {:.1}", time, current);
    }

    controller.set_trigger_source(1, TriggerSource::ExternalTrigger)?;
    controller.set_continuous(1, true)?;
    controller.trigger(1)?;
    controller.set_trigger_out(1, true)?;

    sim.set_overlap(&[1]);
    wait_for(&event_recv, |event| matches!(event, Event::OverlapWarning(_)));
    sim.set_overlap(&[]);

    controller.stop(0)?;
    controller.stop(1)?;
    controller.disconnect();
    wait_for(&event_recv, |event| event == &Event::Disconnected);
    Ok(())
}
