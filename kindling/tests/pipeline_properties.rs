use kindling::prelude::*;
use kindling::{DType, HookName, InputTransformState};
use serde_json::json;

fn plus(n: i64) -> SharedTransform {
    shared(move |v: Value| -> kindling::Result<Value> {
        Ok(Value::Int(v.as_int().unwrap_or_default() + n))
    })
}

fn times(n: i64) -> SharedTransform {
    shared(move |v: Value| -> kindling::Result<Value> {
        Ok(Value::Int(v.as_int().unwrap_or_default() * n))
    })
}

#[test]
fn test_no_overrides_is_identity_everywhere() {
    let sample = Value::map([
        ("input", Value::from(3)),
        ("target", Value::from("cat")),
        ("extra", Value::list([1.5, 2.5])),
    ]);
    for stage in RunningStage::ALL {
        let transform = InputTransform::new(stage);
        assert!(transform.placements().is_empty());
        let resolved = InputTransform::from_hooks(stage, TransformHooks::new()).unwrap();
        assert!(resolved.is_identity());
        for placement in HookPlacement::ALL {
            if placement == HookPlacement::Collate {
                continue;
            }
            assert!(resolved.get(placement).is_none());
            assert_eq!(resolved.apply(placement, sample.clone()).unwrap(), sample);
        }
    }
}

#[test]
fn test_train_specialization_only_applies_to_training() {
    let hooks = TransformHooks::new()
        .hook("train_per_sample_transform", plus(100))
        .unwrap();

    let train = InputTransform::from_hooks(RunningStage::Training, hooks.clone()).unwrap();
    assert_eq!(
        train.hook_names(HookPlacement::PerSampleTransform),
        ["train_per_sample_transform"]
    );
    assert_eq!(train.per_sample_transform(Value::Int(1)).unwrap(), Value::Int(101));

    let val = InputTransform::from_hooks(RunningStage::Validating, hooks).unwrap();
    assert!(val.get(HookPlacement::PerSampleTransform).is_none());
    assert_eq!(val.per_sample_transform(Value::Int(1)).unwrap(), Value::Int(1));
}

#[test]
fn test_mutually_exclusive_hooks_fail_at_construction() {
    let hooks = TransformHooks::new()
        .hook("per_batch_transform", plus(1))
        .unwrap()
        .hook("per_sample_transform_on_device", plus(2))
        .unwrap();
    let err = InputTransform::from_hooks(RunningStage::Training, hooks).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.mentions("per_batch_transform"));
    assert!(err.mentions("per_sample_transform_on_device"));
}

#[test]
fn test_override_map_with_both_phases_names_both() {
    let err = InputTransform::from_overrides(
        RunningStage::Training,
        [
            ("per_batch_transform", plus(1)),
            ("per_sample_transform_on_device", plus(2)),
        ],
    )
    .unwrap_err();
    assert!(err.is_configuration());
    let offending = err.offending();
    assert!(offending.iter().any(|o| o == "per_batch_transform"));
    assert!(offending.iter().any(|o| o == "per_sample_transform_on_device"));
}

#[test]
fn test_input_key_scope_leaves_target_untouched() {
    let hooks = TransformHooks::new()
        .hook("input_per_sample_transform", times(10))
        .unwrap();
    let transform = InputTransform::from_hooks(RunningStage::Testing, hooks).unwrap();
    let out = transform
        .per_sample_transform(Value::map([("input", 3), ("target", 7)]))
        .unwrap();
    assert_eq!(out, Value::map([("input", 30), ("target", 7)]));
}

#[test]
fn test_hook_names_are_bit_exact() {
    let name: HookName<HookPlacement> = "train_input_per_sample_transform".parse().unwrap();
    assert_eq!(name.stage, Some(RunningStage::Training));
    assert_eq!(name.key, Some(KeyPrefix::Input));
    assert_eq!(name.base, HookPlacement::PerSampleTransform);
    assert_eq!(name.to_string(), "train_input_per_sample_transform");

    for text in [
        "per_batch_transform_on_device",
        "val_target_per_batch_transform",
        "predict_collate",
        "test_per_sample_transform_on_device",
    ] {
        let parsed: HookName<HookPlacement> = text.parse().unwrap();
        assert_eq!(parsed.to_string(), text);
    }
    assert!("input_collate".parse::<HookName<HookPlacement>>().is_err());
}

#[test]
fn test_state_dict_roundtrip_reproduces_output() {
    let registry = TransformRegistry::new("input_transforms")
        .with(
            "affine",
            factory(|kwargs| {
                let scale = kwargs.get("scale").and_then(|v| v.as_i64()).unwrap_or(1);
                let shift = kwargs.get("shift").and_then(|v| v.as_i64()).unwrap_or(0);
                TransformHooks::new()
                    .hook("input_per_sample_transform", times(scale))?
                    .hook("train_per_batch_transform", plus(shift))
            }),
        )
        .unwrap();

    let config = TransformConfig::from_json(&json!(["affine", {"scale": 4, "shift": 1}])).unwrap();
    let original = create_transform(config, RunningStage::Training, None, Some(&registry))
        .unwrap()
        .unwrap();

    let state_json = original.get_state_dict().to_json().unwrap();
    let state = InputTransformState::from_json(&state_json).unwrap();
    let restored = InputTransform::load_state_dict(&state, Some(&registry)).unwrap();

    let sample = Value::map([("input", 5), ("target", 0)]);
    assert_eq!(
        restored.per_sample_transform(sample.clone()).unwrap(),
        original.per_sample_transform(sample).unwrap()
    );
    assert_eq!(
        restored.per_batch_transform(Value::Int(2)).unwrap(),
        original.per_batch_transform(Value::Int(2)).unwrap()
    );
    assert_eq!(restored.get_state_dict(), original.get_state_dict());
}

#[test]
fn test_input_variant_must_match_data() {
    let with_len = || Some(RawData::from(vec![Value::from(1), Value::from(2), Value::from(3)]));
    let without_len = || Some(RawData::stream(|| (0..3).map(Value::Int)));

    assert!(Input::new(RunningStage::Training, with_len()).is_ok());
    let err = Input::new(RunningStage::Training, without_len()).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.mentions("IterableInput"));

    let err = IterableInput::new(RunningStage::Training, with_len()).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("Use `Input` instead"));
    assert!(IterableInput::new(RunningStage::Training, without_len()).is_ok());
}

#[test]
fn test_default_collate_fallback_stacks_input() {
    let transform = InputTransform::new(RunningStage::Training);
    let batch = transform
        .collate(vec![Value::map([("input", 1)]), Value::map([("input", 2)])], None)
        .unwrap();
    let input = batch.get("input").and_then(Value::as_tensor).unwrap();
    assert_eq!(input.shape(), &[2]);

    let back = default_uncollate(batch).unwrap();
    assert_eq!(back.len(), 2);
}

#[test]
fn test_token_lists_are_transformed_as_whole_samples() {
    let total = shared(|v: Value| -> kindling::Result<Value> {
        let tokens = v.as_list().unwrap_or_default();
        Ok(Value::Int(tokens.iter().filter_map(Value::as_int).sum()))
    });
    let samples = vec![Value::list([1, 2, 3]), Value::list([10, 20]), Value::list([16_777_217])];
    let input = Input::from_values(RunningStage::Predicting, samples)
        .unwrap()
        .with_transform(Some(TransformConfig::Callable(total)), None, None)
        .unwrap();
    let loader = DataLoaderBuilder::new(input)
        .batch_size(3)
        .build(SequentialSampler::new())
        .unwrap();

    let batch = loader.iter().next().unwrap().unwrap();
    let totals = batch.as_tensor().unwrap();
    assert_eq!(totals.dtype(), DType::Int64);
    assert_eq!(totals.to_i64_vec(), Some(vec![6, 30, 16_777_217]));
}
