//! spibus-dummy - In-memory SPI backend for testing
//!
//! This crate provides a backend that records every primitive transfer and
//! chip-select change instead of touching hardware. It's useful for testing
//! and for dry runs of the CLI.
//!
//! Received bytes are produced as follows:
//!
//! - duplex descriptors loop the transmitted bytes back
//! - receive-only descriptors get a running counter (0, 1, 2, ... wrapping)
//!
//! Failures can be injected for individual transfer calls, for chip-select
//! changes and for any configuration step of the connector.

use spibus_core::{
    BusConfig, ChipSelect, ConfigStep, Connector, Descriptor, Error, Result, SpiBus, Transport,
};

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Transmitted bytes, if the descriptor had a transmit buffer
    pub tx: Option<Vec<u8>>,
    /// Receive length, if the descriptor had a receive buffer
    pub rx_len: Option<usize>,
    /// Descriptor length
    pub len: usize,
    /// Chip-select change flag
    pub cs_change: bool,
}

/// One recorded bus event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Chip-select asserted (`true`) or deasserted (`false`)
    ChipSelect(bool),
    /// One primitive transfer call with its descriptors
    Transfer(Vec<Segment>),
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    calls: usize,
    fail_calls: Vec<usize>,
    fail_connect: Option<ConfigStep>,
    fail_assert: bool,
    fail_deassert: bool,
    opened: usize,
    closed: usize,
    counter: u8,
    config: Option<BusConfig>,
}

/// Shared view of the dummy bus
///
/// All connectors, devices and chip-select hooks created from one recorder
/// log into the same event list.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<State>>,
}

impl Recorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connector opening devices that log into this recorder
    pub fn connector(&self) -> DummyConnector {
        DummyConnector {
            recorder: self.clone(),
        }
    }

    /// Chip-select hook that logs into this recorder
    pub fn chip_select(&self) -> DummyChipSelect {
        DummyChipSelect {
            recorder: self.clone(),
        }
    }

    /// Make the primitive call with zero-based index `call` fail
    pub fn fail_transfer(&self, call: usize) {
        self.state().fail_calls.push(call);
    }

    /// Make the next connections fail at `step` (`None` to stop failing)
    pub fn fail_connect(&self, step: Option<ConfigStep>) {
        self.state().fail_connect = step;
    }

    /// Make the chip-select hook fail on assert and/or deassert
    pub fn fail_chip_select(&self, assert: bool, deassert: bool) {
        let mut state = self.state();
        state.fail_assert = assert;
        state.fail_deassert = deassert;
    }

    /// All recorded events in order
    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Recorded transfer calls in order
    pub fn transfers(&self) -> Vec<Vec<Segment>> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Transfer(segments) => Some(segments.clone()),
                Event::ChipSelect(_) => None,
            })
            .collect()
    }

    /// Recorded chip-select changes in order
    pub fn chip_select_events(&self) -> Vec<bool> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::ChipSelect(asserted) => Some(*asserted),
                Event::Transfer(_) => None,
            })
            .collect()
    }

    /// Number of devices opened so far
    pub fn open_count(&self) -> usize {
        self.state().opened
    }

    /// Number of devices closed so far
    pub fn close_count(&self) -> usize {
        self.state().closed
    }

    /// Configuration of the last successful connection
    pub fn last_config(&self) -> Option<BusConfig> {
        self.state().config.clone()
    }

    /// Forget recorded events and reset the call counter
    pub fn clear(&self) {
        let mut state = self.state();
        state.events.clear();
        state.calls = 0;
        state.counter = 0;
    }
}

/// Connector for the dummy bus
#[derive(Debug, Clone)]
pub struct DummyConnector {
    recorder: Recorder,
}

impl Connector for DummyConnector {
    type Device = DummyDevice;

    fn connect(&mut self, config: &BusConfig) -> Result<DummyDevice> {
        if config.device.is_empty() {
            return Err(Error::NoDevice);
        }

        let mut state = self.recorder.state();
        if let Some(step) = state.fail_connect {
            return Err(Error::Configure {
                step,
                source: io::Error::other("injected failure"),
            });
        }

        state.opened += 1;
        state.config = Some(config.clone());
        log::debug!(
            "dummy: Opened {} (mode={}, speed={} kHz, bits={})",
            config.device,
            config.mode,
            config.speed_hz / 1000,
            config.bits_per_word
        );

        Ok(DummyDevice {
            recorder: self.recorder.clone(),
        })
    }
}

/// An open dummy bus device
#[derive(Debug)]
pub struct DummyDevice {
    recorder: Recorder,
}

impl Transport for DummyDevice {
    fn transfer(&mut self, descriptors: &mut [Descriptor<'_>]) -> io::Result<()> {
        let mut state = self.recorder.state();
        let call = state.calls;
        state.calls += 1;

        let segments = descriptors
            .iter()
            .map(|d| Segment {
                tx: d.tx().map(<[u8]>::to_vec),
                rx_len: d.has_rx().then_some(d.len()),
                len: d.len(),
                cs_change: d.cs_change(),
            })
            .collect();
        state.events.push(Event::Transfer(segments));

        if state.fail_calls.contains(&call) {
            return Err(io::Error::other(format!("injected failure on call {}", call)));
        }

        for d in descriptors.iter_mut() {
            let tx = d.tx().map(<[u8]>::to_vec);
            let Some(rx) = d.rx() else { continue };
            match tx {
                Some(tx) => rx.copy_from_slice(&tx),
                None => {
                    for b in rx.iter_mut() {
                        *b = state.counter;
                        state.counter = state.counter.wrapping_add(1);
                    }
                }
            }
        }

        Ok(())
    }
}

impl Drop for DummyDevice {
    fn drop(&mut self) {
        self.recorder.state().closed += 1;
    }
}

/// Chip-select hook for the dummy bus
#[derive(Debug, Clone)]
pub struct DummyChipSelect {
    recorder: Recorder,
}

impl ChipSelect for DummyChipSelect {
    fn set(&mut self, asserted: bool) -> io::Result<()> {
        let mut state = self.recorder.state();
        state.events.push(Event::ChipSelect(asserted));

        let fail = if asserted {
            state.fail_assert
        } else {
            state.fail_deassert
        };
        if fail {
            return Err(io::Error::other("injected chip-select failure"));
        }
        Ok(())
    }
}

/// Parse dummy backend options
///
/// - `chunk=<n>` - maximum transfer length in bytes (0 for the default)
/// - `cs=1` - drive a recorded chip-select hook around each transfer
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<(usize, bool), String> {
    let mut chunk = 0;
    let mut chip_select = false;

    for (key, value) in options {
        match *key {
            "chunk" => {
                chunk = value
                    .parse()
                    .map_err(|_| format!("Invalid chunk value: {}", value))?;
            }
            "cs" => {
                chip_select = match *value {
                    "0" | "no" | "off" => false,
                    "1" | "yes" | "on" => true,
                    _ => return Err(format!("Invalid cs value: {}", value)),
                };
            }
            _ => {
                log::warn!("dummy: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok((chunk, chip_select))
}

/// Open a dummy bus session
///
/// This is a convenience function for use in the CLI backend dispatch.
pub fn open_dummy(
    options: &[(&str, &str)],
) -> std::result::Result<SpiBus<DummyConnector>, Box<dyn std::error::Error>> {
    let (chunk, chip_select) = parse_options(options)?;

    let recorder = Recorder::new();
    let bus = SpiBus::new(recorder.connector());
    bus.init(&BusConfig::new("dummy"))?;
    bus.set_max_transfer_len(chunk);
    if chip_select {
        bus.set_chip_select_hook(recorder.chip_select());
    }

    Ok(bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibus_core::Mode;
    use std::thread;

    fn open(chunk: usize) -> (Recorder, SpiBus<DummyConnector>) {
        let recorder = Recorder::new();
        let bus = SpiBus::new(recorder.connector());
        bus.init(&BusConfig::new("/dev/spidev0.0")).unwrap();
        bus.set_max_transfer_len(chunk);
        bus.set_chip_select_hook(recorder.chip_select());
        (recorder, bus)
    }

    fn tx_only(bytes: &[u8]) -> Segment {
        Segment {
            tx: Some(bytes.to_vec()),
            rx_len: None,
            len: bytes.len(),
            cs_change: false,
        }
    }

    #[test]
    fn test_write_splits_into_chunks() {
        let (recorder, bus) = open(4096);
        let data: Vec<u8> = (0..10000).map(|i| (i % 251) as u8).collect();

        bus.write(&data).unwrap();

        let transfers = recorder.transfers();
        let lens: Vec<usize> = transfers.iter().map(|t| t[0].len).collect();
        assert_eq!(lens, [4096, 4096, 1808]);
        assert!(transfers.iter().all(|t| t.len() == 1));

        // Offsets 0, 4096, 8192: the chunks concatenate back to the input
        let sent: Vec<u8> = transfers
            .iter()
            .flat_map(|t| t[0].tx.clone().unwrap())
            .collect();
        assert_eq!(sent, data);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_read_covers_buffer_in_order() {
        let (recorder, bus) = open(64);
        let mut buf = vec![0xFFu8; 1000];

        bus.read(&mut buf).unwrap();

        assert_eq!(recorder.transfers().len(), 16);
        for (i, b) in buf.iter().enumerate() {
            assert_eq!(*b, i as u8);
        }
        assert!(recorder
            .transfers()
            .iter()
            .all(|t| t.len() == 1 && t[0].tx.is_none()));
    }

    #[test]
    fn test_read_reg_single_chunk() {
        let (recorder, bus) = open(4096);
        let mut buf = [0u8; 3];

        bus.read_reg(0x2A, &mut buf).unwrap();

        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(
            transfers[0],
            vec![
                tx_only(&[0x2A]),
                Segment {
                    tx: None,
                    rx_len: Some(3),
                    len: 3,
                    cs_change: false,
                },
            ]
        );
        assert_eq!(buf, [0, 1, 2]);
    }

    #[test]
    fn test_write_reg_sends_address_once() {
        let (recorder, bus) = open(4096);
        let data = vec![0x5Au8; 9000];

        bus.write_reg(0x80, &data).unwrap();

        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 3);
        assert_eq!(transfers[0].len(), 2);
        assert_eq!(transfers[0][0], tx_only(&[0x80]));
        assert_eq!(transfers[0][1].len, 4096);
        assert_eq!(transfers[1], vec![tx_only(&data[4096..8192])]);
        assert_eq!(transfers[2], vec![tx_only(&data[8192..])]);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_transfer_reg_first_call_is_address_plus_duplex() {
        let (recorder, bus) = open(2);
        let mut buf = [0u8; 3];

        bus.transfer_reg(0x11, &[0xA0, 0xA1, 0xA2], &mut buf).unwrap();

        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0][0], tx_only(&[0x11]));
        assert_eq!(transfers[0][1].tx.as_deref(), Some(&[0xA0, 0xA1][..]));
        assert_eq!(transfers[0][1].rx_len, Some(2));
        assert_eq!(transfers[1].len(), 1);
        assert_eq!(transfers[1][0].tx.as_deref(), Some(&[0xA2][..]));
        assert_eq!(transfers[1][0].rx_len, Some(1));
        assert_eq!(buf, [0xA0, 0xA1, 0xA2]);
    }

    #[test]
    fn test_empty_write_does_nothing() {
        let (recorder, bus) = open(4096);

        assert!(matches!(bus.write(&[]), Err(Error::EmptyWriteBuffer)));
        assert!(matches!(bus.write_reg(0x01, &[]), Err(Error::EmptyWriteBuffer)));
        assert!(matches!(
            bus.transfer(&[], &mut [0u8; 4]),
            Err(Error::EmptyWriteBuffer)
        ));

        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_failure_stops_remaining_chunks() {
        let (recorder, bus) = open(4);
        recorder.fail_transfer(1);

        let err = bus.write(&[0u8; 12]).unwrap_err();

        assert!(matches!(err, Error::TransferFailed { chunk: 1, .. }));
        assert_eq!(err.code(), -16);
        // Chunk 0 succeeded, chunk 1 was attempted, chunk 2 never was
        assert_eq!(recorder.transfers().len(), 2);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_duplex_short_write_is_zero_padded() {
        let (recorder, bus) = open(4096);
        let mut buf = [0xFFu8; 5];

        bus.transfer(&[0x12, 0x34], &mut buf).unwrap();

        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].len(), 1);
        assert_eq!(
            transfers[0][0].tx.as_deref(),
            Some(&[0x12, 0x34, 0, 0, 0][..])
        );
        assert_eq!(transfers[0][0].rx_len, Some(5));
        assert_eq!(buf, [0x12, 0x34, 0, 0, 0]);
    }

    #[test]
    fn test_duplex_short_read_is_truncated() {
        let (recorder, bus) = open(4);
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut buf = [0u8; 2];

        bus.transfer(&data, &mut buf).unwrap();

        let sent: Vec<u8> = recorder
            .transfers()
            .iter()
            .flat_map(|t| t[0].tx.clone().unwrap())
            .collect();
        assert_eq!(sent, data);
        assert_eq!(buf, [1, 2]);
    }

    #[test]
    fn test_duplex_failure_leaves_read_buffer_untouched() {
        let (recorder, bus) = open(4096);
        recorder.fail_transfer(0);
        let mut buf = [0xEEu8; 4];

        let err = bus.transfer(&[1, 2, 3, 4], &mut buf).unwrap_err();

        assert!(matches!(err, Error::TransferFailed { chunk: 0, .. }));
        assert_eq!(buf, [0xEE; 4]);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_addressed_failure_on_middle_chunk() {
        let (recorder, bus) = open(4);
        recorder.fail_transfer(1);

        let err = bus.write_reg(0x80, &[0x33u8; 12]).unwrap_err();

        assert!(matches!(err, Error::TransferFailed { chunk: 1, .. }));
        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0][0], tx_only(&[0x80]));
        assert_eq!(transfers[0][1], tx_only(&[0x33; 4]));
        assert_eq!(transfers[1], vec![tx_only(&[0x33; 4])]);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_read_reg_multi_chunk() {
        let (recorder, bus) = open(4);
        let mut buf = [0u8; 10];

        bus.read_reg(0x0F, &mut buf).unwrap();

        let rx = |len| Segment {
            tx: None,
            rx_len: Some(len),
            len,
            cs_change: false,
        };
        assert_eq!(
            recorder.transfers(),
            vec![vec![tx_only(&[0x0F]), rx(4)], vec![rx(4)], vec![rx(2)]]
        );
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_transfer_reg_short_write_is_zero_padded() {
        let (recorder, bus) = open(2);
        let mut buf = [0xFFu8; 3];

        bus.transfer_reg(0x40, &[0xAB], &mut buf).unwrap();

        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0][0], tx_only(&[0x40]));
        assert_eq!(transfers[0][1].tx.as_deref(), Some(&[0xAB, 0][..]));
        assert_eq!(transfers[1].len(), 1);
        assert_eq!(transfers[1][0].tx.as_deref(), Some(&[0][..]));
        assert_eq!(buf, [0xAB, 0, 0]);
    }

    #[test]
    fn test_transfer_reg_short_read_is_truncated() {
        let (recorder, bus) = open(4);
        let mut buf = [0u8; 2];

        bus.transfer_reg(0x40, &[1, 2, 3, 4, 5], &mut buf).unwrap();

        let transfers = recorder.transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0][0], tx_only(&[0x40]));
        assert_eq!(transfers[0][1].tx.as_deref(), Some(&[1, 2, 3, 4][..]));
        assert_eq!(transfers[0][1].rx_len, Some(4));
        assert_eq!(transfers[1][0].tx.as_deref(), Some(&[5][..]));
        assert_eq!(buf, [1, 2]);
    }

    #[test]
    fn test_assert_failure_skips_io_and_deassert() {
        let (recorder, bus) = open(4096);
        recorder.fail_chip_select(true, false);

        let err = bus.write(&[1, 2, 3]).unwrap_err();

        assert!(matches!(err, Error::ChipSelectAssert(_)));
        assert!(recorder.transfers().is_empty());
        assert_eq!(recorder.chip_select_events(), [true]);
    }

    #[test]
    fn test_deassert_failure_is_reported_after_io() {
        let (recorder, bus) = open(4096);
        recorder.fail_chip_select(false, true);

        let err = bus.write(&[1, 2, 3]).unwrap_err();

        assert!(matches!(err, Error::ChipSelectDeassert(_)));
        assert_eq!(recorder.transfers().len(), 1);
        assert_eq!(recorder.chip_select_events(), [true, false]);
    }

    #[test]
    fn test_transfer_error_wins_over_deassert_error() {
        let (recorder, bus) = open(4096);
        recorder.fail_chip_select(false, true);
        recorder.fail_transfer(0);

        let err = bus.read(&mut [0u8; 8]).unwrap_err();
        assert!(matches!(err, Error::TransferFailed { .. }));
    }

    #[test]
    fn test_external_chip_select_emits_no_events() {
        let (recorder, bus) = open(4096);
        bus.clear_chip_select();

        bus.write(&[1, 2]).unwrap();

        assert_eq!(recorder.chip_select_events(), Vec::<bool>::new());
        assert_eq!(recorder.transfers().len(), 1);
    }

    #[test]
    fn test_closed_session_rejects_transfers() {
        let (recorder, bus) = open(4096);
        assert!(bus.close());

        assert!(matches!(bus.write(&[1]), Err(Error::NotOpen)));
        assert!(matches!(bus.read_reg(0, &mut [0]), Err(Error::NotOpen)));
        assert!(matches!(
            bus.transfer_reg(0, &[1], &mut [0]),
            Err(Error::NotOpen)
        ));
        assert!(recorder.events().is_empty());
        assert_eq!(recorder.close_count(), 1);
    }

    #[test]
    fn test_init_twice_reopens() {
        let (recorder, bus) = open(4096);
        let config = BusConfig::new("/dev/spidev0.0")
            .with_mode(Mode::Mode3)
            .with_speed(1_000_000);

        bus.init(&config).unwrap();
        bus.init(&config).unwrap();

        assert_eq!(recorder.open_count(), 3);
        assert_eq!(recorder.close_count(), 2);
        assert_eq!(recorder.last_config(), Some(config));
        bus.write(&[0xAB]).unwrap();
    }

    #[test]
    fn test_connect_failures_are_distinct() {
        let recorder = Recorder::new();
        let bus = SpiBus::new(recorder.connector());

        let err = bus.init(&BusConfig::new("")).unwrap_err();
        assert!(matches!(err, Error::NoDevice));

        let mut codes = Vec::new();
        for step in [
            ConfigStep::WriteMode,
            ConfigStep::ReadMode,
            ConfigStep::WriteSpeed,
            ConfigStep::ReadSpeed,
            ConfigStep::WriteBitsPerWord,
            ConfigStep::ReadBitsPerWord,
        ] {
            recorder.fail_connect(Some(step));
            let err = bus.init(&BusConfig::new("/dev/spidev0.0")).unwrap_err();
            assert!(matches!(err, Error::Configure { step: s, .. } if s == step));
            codes.push(err.code());
        }
        assert_eq!(codes, [-4, -5, -6, -7, -8, -9]);
        assert!(!bus.is_open());

        recorder.fail_connect(None);
        bus.init(&BusConfig::new("/dev/spidev0.0")).unwrap();
        assert!(bus.is_open());
    }

    #[test]
    fn test_failed_reinit_closes_previous_device() {
        let (recorder, bus) = open(4096);
        recorder.fail_connect(Some(ConfigStep::WriteMode));

        assert!(bus.init(&BusConfig::new("/dev/spidev0.0")).is_err());

        assert!(!bus.is_open());
        assert_eq!(recorder.close_count(), 1);
    }

    #[test]
    fn test_concurrent_callers_do_not_interleave() {
        let (recorder, bus) = open(4);
        let bus = Arc::new(bus);

        let workers: Vec<_> = (0..4u8)
            .map(|id| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    for _ in 0..5 {
                        bus.write(&[id; 10]).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let events = recorder.events();
        assert_eq!(events.len(), 20 * 5);
        for window in events.chunks(5) {
            assert_eq!(window[0], Event::ChipSelect(true));
            assert_eq!(window[4], Event::ChipSelect(false));

            let mut owner = None;
            for event in &window[1..4] {
                let Event::Transfer(segments) = event else {
                    panic!("unexpected event {:?}", event);
                };
                let tx = segments[0].tx.as_ref().unwrap();
                let id = tx[0];
                assert!(tx.iter().all(|&b| b == id));
                assert_eq!(*owner.get_or_insert(id), id);
            }
        }
    }

    #[test]
    fn test_open_dummy_options() {
        let bus = open_dummy(&[("chunk", "16"), ("cs", "1")]).unwrap();
        assert!(bus.is_open());
        assert_eq!(bus.max_transfer_len(), 16);

        assert!(parse_options(&[("chunk", "abc")]).is_err());
        assert!(parse_options(&[("cs", "maybe")]).is_err());
        assert_eq!(parse_options(&[]).unwrap(), (0, false));
    }
}
