//! End-to-end checks against the model shipped in `models/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use ed25519_dalek::SigningKey;
use tempfile::tempdir;

use ocusight::adapters::artifact::{
    sign_manifest, ArtifactManifest, VerificationPolicy, METADATA_FILE, MODEL_FILE,
};
use ocusight::adapters::gbdt::{sigmoid, GbdtOracle};
use ocusight::application::EvaluationService;
use ocusight::config::{PublicKeySource, Settings};
use ocusight::domain::{build, FeatureSchema, Gender, PatientInput, RiskLabel, DEFAULT_FEATURE_ORDER};
use ocusight::ports::ScoringOracle;
use ocusight::OcuSightError;

fn bundled_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("models")
}

fn bundled_settings() -> Settings {
    Settings {
        model_dir: bundled_dir(),
        ..Settings::default()
    }
}

fn high_risk_patient() -> PatientInput {
    PatientInput {
        age: 72,
        gender: Gender::Female,
        iop: 29.0,
        cct: 480.0,
        heart_rate: 100,
        bp_sys: 165,
        screen_time_h: 11.0,
        sleep_h: 4.0,
        blink_per_min: 9,
        pupil_mm: 5.0,
    }
}

#[test]
fn default_patient_scores_low_with_six_contributions() {
    let service = EvaluationService::bootstrap(&bundled_settings()).expect("bootstrap");
    assert_eq!(service.schema(), &FeatureSchema::default());

    let result = service.evaluate(&PatientInput::default()).expect("evaluate");
    assert!((0.0..=1.0).contains(&result.probability));
    assert!((result.probability - 0.1633).abs() < 1e-3, "{}", result.probability);
    assert_eq!(result.label, RiskLabel::Low);
    assert_eq!(result.threshold, 0.5);
    assert_eq!(result.attributions.len(), 6);
    for pair in result.attributions.windows(2) {
        assert!(pair[0].impact.abs() >= pair[1].impact.abs());
    }

    // Same input, same output.
    assert_eq!(service.evaluate(&PatientInput::default()).unwrap(), result);
}

#[test]
fn high_risk_patient_scores_high() {
    let service = EvaluationService::bootstrap(&bundled_settings()).expect("bootstrap");
    let result = service.evaluate(&high_risk_patient()).expect("evaluate");
    assert_eq!(result.label, RiskLabel::High);
    assert!(result.probability > 0.7, "{}", result.probability);
    assert!(result.attributions.iter().all(|a| a.impact.is_finite()));
}

#[test]
fn bundled_model_explanations_are_additive() {
    let mut oracle = GbdtOracle::new();
    oracle
        .load_model(&bundled_dir(), &VerificationPolicy::default())
        .expect("bundled model loads");
    let schema = FeatureSchema::default();

    for patient in [PatientInput::default(), high_risk_patient()] {
        let vector = build(&patient, &schema).expect("build");

        let probability = oracle.predict_probability(&vector).unwrap();
        let impacts = oracle.explain(&vector).unwrap();
        assert_eq!(impacts.len(), 14);

        let margin = oracle.expected_value().unwrap() + impacts.values().sum::<f64>();
        assert!((sigmoid(margin) - probability).abs() < 1e-9);
    }
}

#[test]
fn default_patient_derived_features() {
    let vector = build(&PatientInput::default(), &FeatureSchema::default()).expect("build");
    assert_eq!(vector.get("iop_cct_ratio"), Some(0.0296));
    assert_eq!(vector.get("screen_sleep_ratio"), Some(0.857));
    assert_eq!(vector.get("age_iop"), Some(28.28));
    assert_eq!(vector.get("bp_screen"), Some(6.4));
}

fn copy_bundle(dst: &Path) {
    for name in [MODEL_FILE, METADATA_FILE] {
        std::fs::copy(bundled_dir().join(name), dst.join(name)).expect("copy artifact");
    }
}

#[test]
fn signed_bundle_loads_and_tampering_disables_the_model() {
    let temp = tempdir().expect("tempdir");
    copy_bundle(temp.path());

    let signing_key = SigningKey::from_bytes(&[42u8; 32]);
    let manifest =
        ArtifactManifest::for_files(temp.path(), &[MODEL_FILE, METADATA_FILE]).expect("manifest");
    sign_manifest(temp.path(), &manifest, &signing_key).expect("sign");

    let pub_b64 = base64::engine::general_purpose::STANDARD
        .encode(signing_key.verifying_key().as_bytes());
    let settings = Settings {
        model_dir: temp.path().to_path_buf(),
        require_signed_model: true,
        public_key: Some(PublicKeySource::Inline(pub_b64)),
        ..Settings::default()
    };

    let service = EvaluationService::bootstrap(&settings).expect("bootstrap");
    assert!(service.evaluate(&PatientInput::default()).is_ok());

    // Lowering the threshold in the bound metadata breaks the digest.
    std::fs::write(
        temp.path().join(METADATA_FILE),
        r#"{"features":["age"],"threshold":0.01}"#,
    )
    .unwrap();
    let service = EvaluationService::bootstrap(&settings).expect("bootstrap");
    match service.evaluate(&PatientInput::default()) {
        Err(OcuSightError::ModelUnavailable(reason)) => {
            assert!(reason.contains("digest mismatch"), "{reason}")
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn signed_model_ignores_unbound_metadata_threshold() {
    let temp = tempdir().expect("tempdir");
    copy_bundle(temp.path());

    let signing_key = SigningKey::from_bytes(&[42u8; 32]);
    let manifest = ArtifactManifest::for_files(temp.path(), &[MODEL_FILE]).expect("manifest");
    sign_manifest(temp.path(), &manifest, &signing_key).expect("sign");
    let meta = serde_json::json!({ "features": DEFAULT_FEATURE_ORDER, "threshold": 0.01 });
    std::fs::write(temp.path().join(METADATA_FILE), meta.to_string()).unwrap();

    let settings = Settings {
        model_dir: temp.path().to_path_buf(),
        require_signed_model: true,
        public_key: Some(PublicKeySource::Inline(
            base64::engine::general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes()),
        )),
        ..Settings::default()
    };

    let result = EvaluationService::bootstrap(&settings)
        .expect("bootstrap")
        .evaluate(&PatientInput::default())
        .expect("signed model scores");
    assert_eq!(result.threshold, 0.5);
    assert!((result.probability - 0.1633).abs() < 1e-3);
    assert_eq!(result.label, RiskLabel::Low);
}

#[test]
fn metadata_with_fewer_features_than_the_model_is_a_schema_mismatch() {
    let temp = tempdir().expect("tempdir");
    copy_bundle(temp.path());
    std::fs::write(
        temp.path().join(METADATA_FILE),
        r#"{"features":["age","iop","cct"],"threshold":0.4}"#,
    )
    .unwrap();

    let service = EvaluationService::bootstrap(&Settings {
        model_dir: temp.path().to_path_buf(),
        ..Settings::default()
    })
    .expect("bootstrap");
    assert_eq!(service.schema().threshold, 0.4);

    let err = service.evaluate(&PatientInput::default()).expect_err("must fail");
    assert!(matches!(err, OcuSightError::SchemaMismatch(_)));
}

#[test]
fn shared_service_gives_identical_results_across_threads() {
    let service = Arc::new(EvaluationService::bootstrap(&bundled_settings()).expect("bootstrap"));
    let expected = service.evaluate(&high_risk_patient()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.evaluate(&high_risk_patient()).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
