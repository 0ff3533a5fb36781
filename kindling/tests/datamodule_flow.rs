use kindling::prelude::*;
use kindling::{ConfigFormat, EnvironmentOverride, InputHooks, InputSnapshot};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scale_registry() -> TransformRegistry {
    TransformRegistry::new("input_transforms")
        .with(
            "scale",
            factory(|kwargs| {
                let factor = kwargs.get("factor").and_then(|v| v.as_i64()).unwrap_or(1);
                TransformHooks::new().hook(
                    "input_per_sample_transform",
                    shared(move |v: Value| -> kindling::Result<Value> {
                        Ok(Value::Int(v.as_int().unwrap_or_default() * factor))
                    }),
                )
            }),
        )
        .unwrap()
}

fn pairs(n: i64) -> Vec<Value> {
    (0..n).map(|i| Value::list([i, i % 2])).collect()
}

fn inputs_of(batch: &Value) -> Vec<f32> {
    batch
        .get("input")
        .and_then(Value::as_tensor)
        .map(|t| t.to_vec())
        .unwrap_or_default()
}

const CONFIG: &str = r#"
batch_size = 2
val_split = 0.25
seed = 7

[transforms]
train = ["scale", { factor = 10 }]
"#;

#[test]
fn test_config_file_drives_split_and_transforms() {
    init_logging();
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let mut manager = ConfigManager::new()
        .with_env_override(EnvironmentOverride::new().with_vars([("KINDLING_NUM_WORKERS", "2")]));
    let config = manager.load_from_file(file.path()).unwrap().clone();
    assert_eq!(config.batch_size, 2);
    assert_eq!(config.num_workers, 2);
    assert_eq!(config.val_split, Some(0.25));

    let datamodule = DataModule::builder()
        .registry(scale_registry())
        .config(&config)
        .unwrap()
        .train_input(DatasetInput::new(RunningStage::Training, pairs(8)).unwrap())
        .build()
        .unwrap();

    assert_eq!(datamodule.train_input().and_then(|i| i.len()), Some(6));
    assert_eq!(datamodule.val_input().and_then(|i| i.len()), Some(2));
    assert_eq!(
        datamodule.val_input().map(|i| i.running_stage()),
        Some(RunningStage::Validating)
    );

    let train = datamodule.train_dataloader().unwrap().unwrap();
    assert!(train.config().drop_last);
    assert_eq!(train.config().num_workers, 2);

    let mut seen = BTreeSet::new();
    for batch in train.iter() {
        let batch = datamodule
            .on_after_batch_transfer(batch.unwrap(), RunningStage::Training)
            .unwrap();
        let values = inputs_of(&batch);
        assert_eq!(values.len(), 2);
        seen.extend(values.into_iter().map(|v| v as i64));
    }

    let val = datamodule.val_dataloader().unwrap().unwrap();
    for batch in val.iter() {
        seen.extend(inputs_of(&batch.unwrap()).into_iter().map(|v| v as i64));
    }

    let expected: BTreeSet<i64> = (0..8).map(|i| i * 10).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_same_seed_gives_same_split() {
    let split = |seed| {
        let module = DataModule::builder()
            .batch_size(2)
            .val_split(0.5)
            .seed(seed)
            .train_input(DatasetInput::new(RunningStage::Training, pairs(10)).unwrap())
            .build()
            .unwrap();
        let loader = module.val_dataloader().unwrap().unwrap();
        loader
            .iter()
            .flat_map(|b| inputs_of(&b.unwrap()))
            .collect::<Vec<_>>()
    };
    assert_eq!(split(3), split(3));
    assert_eq!(split(3).len(), 5);
}

#[test]
fn test_invalid_datamodule_settings() {
    let err = DataModule::builder()
        .train_input(DatasetInput::new(RunningStage::Training, pairs(4)).unwrap())
        .build()
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("batch_size"));

    let err = DataModule::builder()
        .batch_size(2)
        .val_split(0.2)
        .train_input(DatasetInput::new(RunningStage::Training, pairs(4)).unwrap())
        .val_input(DatasetInput::new(RunningStage::Validating, pairs(2)).unwrap())
        .build()
        .unwrap_err();
    assert!(err.mentions("val_split"));

    let stream = IterableInput::new(
        RunningStage::Training,
        Some(RawData::stream(|| (0..4).map(Value::Int))),
    )
    .unwrap();
    let err = DataModule::builder()
        .batch_size(2)
        .val_split(0.5)
        .train_input(stream)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("IterableDataset"));
}

#[test]
fn test_fetcher_sees_every_phase() {
    let fetcher = Arc::new(BaseDataFetcher::new());
    let hooks = TransformHooks::new()
        .hook(
            "per_batch_transform_on_device",
            shared(|batch: Value| -> kindling::Result<Value> { Ok(batch) }),
        )
        .unwrap();
    let test_input = DatasetInput::new(RunningStage::Testing, pairs(4))
        .unwrap()
        .with_transform(Some(hooks.into()), None, None)
        .unwrap();

    let datamodule = DataModule::builder()
        .batch_size(2)
        .test_input(test_input)
        .data_fetcher(Arc::clone(&fetcher))
        .build()
        .unwrap();

    let loader = datamodule.test_dataloader().unwrap().unwrap();
    {
        let _guard = fetcher.enable();
        for batch in loader.iter() {
            datamodule
                .on_after_batch_transfer(batch.unwrap(), RunningStage::Testing)
                .unwrap();
        }
    }

    let recorded = fetcher.batches(RunningStage::Testing);
    assert_eq!(recorded.get("load_sample").map(Vec::len), Some(4));
    assert_eq!(recorded.get("collate").map(Vec::len), Some(2));
    assert_eq!(recorded.get("per_batch_transform_on_device").map(Vec::len), Some(2));
    assert!(fetcher.batches(RunningStage::Training).is_empty());
}

#[test]
fn test_predict_batch_size_is_clamped() {
    let datamodule = DataModule::builder()
        .batch_size(16)
        .predict_input(Input::from_values(RunningStage::Predicting, vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap())
        .build()
        .unwrap();
    let loader = datamodule.predict_dataloader().unwrap().unwrap();
    assert_eq!(loader.config().batch_size, 3);
    assert_eq!(loader.len(), Some(1));
}

/// Pairs are generated from a count, so the count is all a snapshot needs
fn counted_pairs() -> InputHooks {
    DatasetInput::hooks().load_data(|raw| match raw {
        RawData::Value(Value::Int(n)) => Ok(InputData::sequence(pairs(n))),
        other => kindling::default_load_data(other),
    })
}

#[test]
fn test_snapshot_restores_a_subset() {
    let input = Input::with_hooks("pairs", RunningStage::Testing, counted_pairs(), Some(Value::Int(6).into()))
        .unwrap()
        .with_source(6);
    let subset = input.subset(vec![4, 1]).unwrap();

    let json = subset.snapshot().to_json().unwrap();
    assert!(!json.contains("target"));
    let snapshot = InputSnapshot::from_json(&json).unwrap();
    let restored = Input::from_snapshot(&snapshot, counted_pairs(), true).unwrap();

    assert_eq!(restored.len(), 2);
    assert_eq!(restored.get(0).unwrap(), subset.get(0).unwrap());
    assert_eq!(restored.get(1).unwrap(), Value::map([("input", 1), ("target", 1)]));

    let empty = Input::from_snapshot(&snapshot, InputHooks::new(), false).unwrap();
    assert!(empty.is_empty());

    let untracked = DatasetInput::new(RunningStage::Testing, pairs(6)).unwrap();
    let snapshot = untracked.snapshot();
    assert!(snapshot.source.is_none());
    assert!(Input::from_snapshot(&snapshot, DatasetInput::hooks(), true).unwrap().is_empty());
}

#[test]
fn test_config_string_roundtrip_with_loader() {
    let mut manager = ConfigManager::new().with_env_override(EnvironmentOverride::new().with_vars(
        Vec::<(String, String)>::new(),
    ));
    let config = manager
        .load_from_string(r#"{"batch_size": 3, "prefetch_factor": 4}"#, ConfigFormat::Json)
        .unwrap();
    assert_eq!(config.batch_size, 3);
    assert_eq!(config.prefetch_factor, 4);
    assert_eq!(config.num_workers, 0);

    let err = manager
        .load_from_string("batch_size = 0", ConfigFormat::Toml)
        .unwrap_err();
    assert!(err.is_configuration());
}
