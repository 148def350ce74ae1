//! Synth context tests against the counting mock backend

use conduit::synth::mock::{MockBackend, SynthCall};
use conduit::synth::{CreateStage, SettingsStore, SynthError};
use conduit::{SynthConfig, SynthContext};

fn config() -> SynthConfig {
    SynthConfig::new("conduit-test")
        .polyphony(64)
        .sample_rate(48000.0)
        .audio_driver("jack")
}

#[test]
fn test_full_lifecycle_releases_in_reverse() {
    let backend = MockBackend::new();
    let mut context = SynthContext::new(backend.clone(), &config()).unwrap();
    assert_eq!(backend.events(), vec!["settings+", "synth+", "driver+"]);

    context.destroy();
    context.destroy();
    drop(context);

    assert_eq!(
        backend.events(),
        vec!["settings+", "synth+", "driver+", "driver-", "synth-", "settings-"]
    );
    let counts = backend.counts();
    assert_eq!(counts.settings_released, 1);
    assert_eq!(counts.synths_released, 1);
    assert_eq!(counts.drivers_released, 1);
}

#[test]
fn test_driver_failure_cleans_up() {
    let backend = MockBackend::new();
    backend.fail_driver(true);

    let err = SynthContext::new(backend.clone(), &config()).err().unwrap();
    assert!(matches!(
        err,
        SynthError::Create {
            stage: CreateStage::Driver,
            ..
        }
    ));
    assert!(err.to_string().starts_with("Couldn't create audio driver"));

    let counts = backend.counts();
    assert_eq!(counts.drivers_created, 0);
    assert_eq!(counts.synths_created, counts.synths_released);
    assert_eq!(counts.settings_created, counts.settings_released);
}

#[test]
fn test_synth_failure_cleans_up() {
    let backend = MockBackend::new();
    backend.fail_synth(true);

    let err = SynthContext::new(backend.clone(), &config()).err().unwrap();
    assert!(err.to_string().starts_with("Couldn't create synth"));
    assert_eq!(backend.events(), vec!["settings+", "settings-"]);
}

#[test]
fn test_configuration_reaches_settings() {
    let context = SynthContext::new(MockBackend::new(), &config()).unwrap();
    let settings = context.settings().unwrap();

    assert_eq!(settings.get_int("synth.polyphony"), Some(64));
    assert_eq!(settings.get_num("synth.sample-rate"), Some(48000.0));
    assert_eq!(settings.get_str("audio.driver").as_deref(), Some("jack"));
    assert_eq!(settings.get_int("audio.jack.autoconnect"), Some(1));
    assert_eq!(
        settings.get_str("audio.jack.id").as_deref(),
        Some("conduit-test")
    );
    assert_eq!(settings.get_int("audio.periods"), Some(8));
    assert_eq!(settings.get_int("audio.period-size"), Some(512));
}

#[test]
fn test_raw_midi_reaches_engine() {
    let mut context = SynthContext::new(MockBackend::new(), &config()).unwrap();

    context.send_bytes(&[0x91, 64, 90]).unwrap();
    context.send_bytes(&[0xE1, 0x00, 0x40]).unwrap();
    context.send_bytes(&[0xC1, 5]).unwrap();
    context.send_bytes(&[0x81, 64, 0]).unwrap();

    assert_eq!(
        context.synth().unwrap().calls(),
        vec![
            SynthCall::NoteOn(1, 64, 90),
            SynthCall::PitchBend(1, 8192),
            SynthCall::ProgramChange(1, 5),
            SynthCall::NoteOff(1, 64),
        ]
    );
}

#[test]
fn test_destroyed_context_rejects_operations() {
    let mut context = SynthContext::new(MockBackend::new(), &config()).unwrap();
    context.destroy();

    assert!(context.is_destroyed());
    assert!(matches!(context.note_on(0, 60, 100), Err(SynthError::Destroyed)));
    assert!(matches!(context.preset_names(), Err(SynthError::Destroyed)));
    assert_eq!(context.audio_drivers(), vec!["mock", "null"]);
}
