use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sysgpio::{Edge, Error, Gpio, Level, PinState, Sunxi};

static NEXT_ROOT: AtomicU32 = AtomicU32::new(0);

/// Builds a fake sysfs tree under the system temp dir.
///
/// Unlike real sysfs attributes, regular files keep stale bytes past the end
/// of a short rewrite, so tests only assert on equal-or-longer rewrites of
/// the same file.
fn fake_sysfs() -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "sysgpio-it-{}-{}",
        std::process::id(),
        NEXT_ROOT.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("export"), "").unwrap();
    fs::write(root.join("unexport"), "").unwrap();
    root
}

fn seed_pin(root: &Path, pin: u32) {
    let dir = root.join(format!("gpio{pin}"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("value"), "0\n").unwrap();
    fs::write(dir.join("direction"), "in\n").unwrap();
    fs::write(dir.join("active_low"), "0\n").unwrap();
    fs::write(dir.join("edge"), "none\n").unwrap();
}

fn raw_value(root: &Path, pin: u32) -> String {
    fs::read_to_string(root.join(format!("gpio{pin}/value")))
        .unwrap()
        .trim()
        .to_string()
}

/// Overwrites a value file in place. Truncate-then-write would expose a
/// momentarily empty file to a concurrently polling watcher.
fn drive_value(root: &Path, pin: u32, value: &str) {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .open(root.join(format!("gpio{pin}/value")))
        .unwrap();
    file.write_all(format!("{value}\n").as_bytes()).unwrap();
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn setup_broadcasts_state_and_initial_across_pins() {
    init_logs();
    let root = fake_sysfs();
    for pin in [1, 2, 3] {
        seed_pin(&root, pin);
    }
    let mut gpio = Gpio::with_sysfs_root(&root);

    gpio.setup(vec![1, 2, 3], PinState::Out, Some(Level::High.into()))
        .unwrap();

    assert_eq!(
        gpio.input(vec![1, 2, 3]).unwrap(),
        vec![Level::High, Level::High, Level::High]
    );
    for pin in [1, 2, 3] {
        assert_eq!(raw_value(&root, pin), "1");
    }
}

#[test]
fn output_writes_the_value_attribute() {
    let root = fake_sysfs();
    seed_pin(&root, 7);
    let mut gpio = Gpio::with_sysfs_root(&root);

    gpio.setup(7, PinState::Out, None).unwrap();
    gpio.output(7, Level::Low).unwrap();
    assert_eq!(raw_value(&root, 7), "0");

    gpio.output(7, Level::High).unwrap();
    assert_eq!(raw_value(&root, 7), "1");
}

#[test]
fn output_pads_a_short_value_list_with_its_last_element() {
    let root = fake_sysfs();
    for pin in [4, 5, 6] {
        seed_pin(&root, pin);
    }
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(vec![4, 5, 6], PinState::Out, None).unwrap();

    gpio.output(vec![4, 5, 6], vec![Level::High, Level::Low])
        .unwrap();

    assert_eq!(raw_value(&root, 4), "1");
    assert_eq!(raw_value(&root, 5), "0");
    assert_eq!(raw_value(&root, 6), "0");
}

#[test]
fn pull_up_translates_to_input_with_preset_high() {
    let root = fake_sysfs();
    seed_pin(&root, 8);
    let mut gpio = Gpio::with_sysfs_root(&root);

    gpio.setup(8, PinState::PullUp, None).unwrap();

    let direction = fs::read_to_string(root.join("gpio8/direction")).unwrap();
    assert_eq!(direction.trim(), "in");
    assert_eq!(raw_value(&root, 8), "1");
}

#[test]
fn empty_initial_level_list_is_rejected() {
    let root = fake_sysfs();
    seed_pin(&root, 10);
    let mut gpio = Gpio::with_sysfs_root(&root);

    let err = gpio
        .setup(vec![10], PinState::Out, Some(Vec::new().into()))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
    // Nothing was set up behind the error.
    assert!(matches!(gpio.input(10).unwrap_err(), Error::NotSetup(10)));
}

#[test]
fn input_before_setup_is_rejected() {
    let root = fake_sysfs();
    let gpio = Gpio::with_sysfs_root(&root);

    let err = gpio.input(9).unwrap_err();
    assert!(matches!(err, Error::NotSetup(9)));
}

#[test]
fn unresolvable_identifier_is_rejected() {
    let root = fake_sysfs();
    let mut gpio = Gpio::with_sysfs_root(&root);

    let err = gpio.setup("PA3", PinState::In, None).unwrap_err();
    assert!(matches!(err, Error::UnresolvedPin(_, "direct")));
}

#[test]
fn sunxi_mode_resolves_port_names() {
    let root = fake_sysfs();
    seed_pin(&root, 3);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.set_mode(Sunxi);
    assert_eq!(gpio.mode(), "sunxi");

    gpio.setup("PA3", PinState::In, None).unwrap();
    assert_eq!(gpio.input_one("PA3").unwrap(), Level::Low);

    // The node the registry exported is the resolved kernel number.
    assert!(root.join("gpio3").exists());
}

#[test]
fn pwm_under_board_naming_sets_the_pin_up_by_number() {
    let root = fake_sysfs();
    seed_pin(&root, 3);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.set_mode(Sunxi);

    let pwm = gpio.pwm("PA3", Some(50.0)).unwrap();
    pwm.start(50.0).unwrap();

    let direction = fs::read_to_string(root.join("gpio3/direction")).unwrap();
    assert_eq!(direction.trim(), "out");

    gpio.cleanup_all().unwrap();
}

#[test]
fn cleanup_removes_pin_pwm_and_watcher_together() {
    init_logs();
    let root = fake_sysfs();
    seed_pin(&root, 30);
    seed_pin(&root, 31);
    let mut gpio = Gpio::with_sysfs_root(&root);

    let pwm = gpio.pwm(30, Some(50.0)).unwrap();
    pwm.start(50.0).unwrap();
    gpio.setup(31, PinState::In, None).unwrap();
    gpio.add_event_detect(31, Edge::Rising, None, None).unwrap();

    gpio.cleanup(vec![30, 31]).unwrap();

    assert!(matches!(gpio.input(30).unwrap_err(), Error::NotSetup(30)));
    assert!(matches!(gpio.input(31).unwrap_err(), Error::NotSetup(31)));
    assert!(matches!(
        gpio.event_detected(31, Some(Duration::ZERO)).unwrap_err(),
        Error::NotAttached(31)
    ));
    // Cleaning an already-clean pin is a no-op.
    gpio.cleanup(30).unwrap();
}

#[test]
fn pwm_duty_cycle_converges_on_the_requested_fraction() {
    init_logs();
    let root = fake_sysfs();
    seed_pin(&root, 12);
    let mut gpio = Gpio::with_sysfs_root(&root);

    let pwm = gpio.pwm(12, Some(50.0)).unwrap();
    // pwm() auto-set-up the pin as an output.
    let direction = fs::read_to_string(root.join("gpio12/direction")).unwrap();
    assert_eq!(direction.trim(), "out");

    pwm.start(30.0).unwrap();

    let mut highs = 0u32;
    let mut samples = 0u32;
    for _ in 0..600 {
        if raw_value(&root, 12) == "1" {
            highs += 1;
        }
        samples += 1;
        thread::sleep(Duration::from_millis(1));
    }

    let fraction = f64::from(highs) / f64::from(samples);
    assert!(
        (0.1..0.5).contains(&fraction),
        "high fraction {fraction} out of range for 30% duty"
    );

    // Retuning mid-run keeps the duty cycle and does not disturb the worker.
    pwm.change_frequency(100.0).unwrap();
    assert_eq!(pwm.frequency(), 100.0);
    assert_eq!(pwm.duty_cycle(), 30.0);
    assert!(pwm.take_fault().is_none());

    gpio.cleanup_all().unwrap();
}

#[test]
fn pwm_stop_pauses_the_worker() {
    let root = fake_sysfs();
    seed_pin(&root, 14);
    let mut gpio = Gpio::with_sysfs_root(&root);

    let pwm = gpio.pwm(14, Some(50.0)).unwrap();
    pwm.start(50.0).unwrap();
    thread::sleep(Duration::from_millis(100));

    pwm.stop();
    // Let an in-progress cycle run out; pausing never truncates a half-cycle.
    thread::sleep(Duration::from_millis(60));

    let frozen = raw_value(&root, 14);
    for _ in 0..10 {
        thread::sleep(Duration::from_millis(10));
        assert_eq!(raw_value(&root, 14), frozen);
    }

    gpio.cleanup_all().unwrap();
}

#[test]
fn pwm_rejects_invalid_parameters() {
    let root = fake_sysfs();
    seed_pin(&root, 15);
    let mut gpio = Gpio::with_sysfs_root(&root);

    assert!(matches!(
        gpio.pwm(15, None).unwrap_err(),
        Error::InvalidFrequency(_)
    ));
    assert!(matches!(
        gpio.pwm(15, Some(0.0)).unwrap_err(),
        Error::InvalidFrequency(_)
    ));

    let pwm = gpio.pwm(15, Some(50.0)).unwrap();
    assert!(matches!(
        pwm.start(100.5).unwrap_err(),
        Error::InvalidDutyCycle(_)
    ));
    assert!(matches!(
        pwm.change_frequency(-1.0).unwrap_err(),
        Error::InvalidFrequency(_)
    ));

    gpio.cleanup_all().unwrap();
}

#[test]
fn pwm_requests_share_one_channel_per_pin() {
    let root = fake_sysfs();
    seed_pin(&root, 16);
    let mut gpio = Gpio::with_sysfs_root(&root);

    let first = gpio.pwm(16, Some(50.0)).unwrap();
    let second = gpio.pwm(16, Some(200.0)).unwrap();

    // The second request retuned the shared channel instead of creating one.
    assert_eq!(first.frequency(), 200.0);
    assert_eq!(second.frequency(), 200.0);

    gpio.cleanup_all().unwrap();
}

#[test]
fn rising_edge_is_reported_exactly_once() {
    init_logs();
    let root = fake_sysfs();
    seed_pin(&root, 21);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(21, PinState::In, None).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    gpio.add_event_detect(
        21,
        Edge::Rising,
        Some(Box::new(move |_pin| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        Some(Duration::from_millis(30)),
    )
    .unwrap();

    let driver = {
        let root = root.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drive_value(&root, 21, "1");
        })
    };

    assert!(gpio.event_detected(21, Some(Duration::from_secs(2))).unwrap());
    driver.join().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // One-shot consumption: no new edge, so a second call times out.
    assert!(!gpio
        .event_detected(21, Some(Duration::from_millis(300)))
        .unwrap());

    gpio.cleanup_all().unwrap();
}

#[test]
fn transition_that_reverts_within_bounce_time_is_suppressed() {
    let root = fake_sysfs();
    seed_pin(&root, 22);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(22, PinState::In, None).unwrap();
    gpio.add_event_detect(22, Edge::Rising, None, Some(Duration::from_millis(300)))
        .unwrap();

    let driver = {
        let root = root.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drive_value(&root, 22, "1");
            thread::sleep(Duration::from_millis(50));
            drive_value(&root, 22, "0");
        })
    };

    assert!(!gpio
        .event_detected(22, Some(Duration::from_millis(800)))
        .unwrap());
    driver.join().unwrap();

    gpio.cleanup_all().unwrap();
}

#[test]
fn disabled_interrupt_gate_pauses_all_watchers() {
    let root = fake_sysfs();
    seed_pin(&root, 23);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(23, PinState::In, None).unwrap();

    gpio.disable_interrupts();
    gpio.add_event_detect(23, Edge::Rising, None, None).unwrap();

    drive_value(&root, 23, "1");
    assert!(!gpio
        .event_detected(23, Some(Duration::from_millis(300)))
        .unwrap());

    gpio.enable_interrupts();
    drive_value(&root, 23, "0");
    thread::sleep(Duration::from_millis(400));
    drive_value(&root, 23, "1");

    assert!(gpio.event_detected(23, Some(Duration::from_secs(3))).unwrap());

    gpio.cleanup_all().unwrap();
}

#[test]
fn transient_value_glitches_do_not_kill_the_watcher() {
    let root = fake_sysfs();
    seed_pin(&root, 33);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(33, PinState::In, None).unwrap();
    gpio.add_event_detect(33, Edge::Rising, None, None).unwrap();

    // Truncating rewrites race the worker's reads with an empty file.
    for _ in 0..200 {
        fs::write(root.join("gpio33/value"), "0\n").unwrap();
    }
    drive_value(&root, 33, "1");

    assert!(gpio.event_detected(33, Some(Duration::from_secs(2))).unwrap());
    assert!(gpio.event_fault(33).unwrap().is_none());

    gpio.cleanup_all().unwrap();
}

#[test]
fn both_edge_polarity_follows_the_construction_time_level() {
    let root = fake_sysfs();
    seed_pin(&root, 24);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(24, PinState::In, None).unwrap();

    // Pin is high at attach time, so the watcher waits for a fall.
    drive_value(&root, 24, "1");
    gpio.add_event_detect(24, Edge::Both, None, None).unwrap();

    let driver = {
        let root = root.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drive_value(&root, 24, "0");
        })
    };

    assert!(gpio.event_detected(24, Some(Duration::from_secs(2))).unwrap());
    driver.join().unwrap();

    gpio.cleanup_all().unwrap();
}

#[test]
fn duplicate_event_detect_requires_explicit_detach() {
    let root = fake_sysfs();
    seed_pin(&root, 25);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(25, PinState::In, None).unwrap();

    gpio.add_event_detect(25, Edge::Rising, None, None).unwrap();
    assert!(matches!(
        gpio.add_event_detect(25, Edge::Falling, None, None)
            .unwrap_err(),
        Error::AlreadyAttached(25)
    ));

    gpio.remove_event_detect(25).unwrap();
    gpio.add_event_detect(25, Edge::Falling, None, None).unwrap();

    assert!(matches!(
        gpio.remove_event_detect(26).unwrap_err(),
        Error::NotSetup(26) | Error::NotAttached(26)
    ));

    gpio.cleanup_all().unwrap();
}

#[test]
fn event_callbacks_can_be_appended_after_attach() {
    let root = fake_sysfs();
    seed_pin(&root, 27);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(27, PinState::In, None).unwrap();

    assert!(matches!(
        gpio.add_event_callback(27, Box::new(|_| {})).unwrap_err(),
        Error::NotAttached(27)
    ));

    let hits = Arc::new(AtomicUsize::new(0));
    gpio.add_event_detect(27, Edge::Rising, None, None).unwrap();
    let counter = hits.clone();
    gpio.add_event_callback(
        27,
        Box::new(move |pin| {
            assert_eq!(pin, 27);
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(50));
    drive_value(&root, 27, "1");

    assert!(gpio.event_detected(27, Some(Duration::from_secs(2))).unwrap());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(gpio.event_fault(27).unwrap().is_none());

    gpio.cleanup_all().unwrap();
}

#[test]
fn wait_for_edge_returns_the_pin_on_success() {
    let root = fake_sysfs();
    seed_pin(&root, 28);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(28, PinState::In, None).unwrap();

    let driver = {
        let root = root.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drive_value(&root, 28, "1");
        })
    };

    let got = gpio
        .wait_for_edge(28, Edge::Rising, Some(Duration::from_secs(2)))
        .unwrap();
    assert_eq!(got, Some(28));
    driver.join().unwrap();

    gpio.cleanup_all().unwrap();
}

#[test]
fn wait_for_edge_times_out_without_a_transition() {
    let root = fake_sysfs();
    seed_pin(&root, 29);
    let mut gpio = Gpio::with_sysfs_root(&root);
    gpio.setup(29, PinState::In, None).unwrap();

    // Falling first waits for high, which never arrives.
    let got = gpio
        .wait_for_edge(29, Edge::Falling, Some(Duration::from_millis(200)))
        .unwrap();
    assert_eq!(got, None);

    gpio.cleanup_all().unwrap();
}
