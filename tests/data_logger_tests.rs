mod common;

use cansat_runtime::{
    DataLogger, LinkedDataModel, LogError, LoggerConfig, SensorError, TickError,
};
use common::{Climate, Impostor, ScriptedSensor, memory_logger, temp_for};
use std::sync::Arc;

#[test]
fn test_read_logs_and_publishes_each_tick() {
    let (mut logger, sink) = memory_logger(3);
    logger.add_sensor(Arc::new(ScriptedSensor::new("thermo")));

    for seq in 0..8 {
        let climate = logger.read::<Climate>().unwrap();
        assert_eq!(climate.value_f64("temp").unwrap(), temp_for(seq));
        assert!(logger.queue().unwrap().len() <= 3);
    }
    let latest = logger.ref_queue().latest_as::<Climate>().unwrap();
    assert_eq!(latest.value_f64("seq").unwrap(), 7.0);
    assert_eq!(logger.ref_queue().len(), 8);

    logger.close().unwrap();
    assert_eq!(sink.header().unwrap(), vec!["thermo-seq", "thermo-temp"]);
    assert_eq!(sink.column("thermo-seq"), (0..8).map(|i| i.to_string()).collect::<Vec<_>>());
}

#[test]
fn test_failed_read_drops_the_tick() {
    let (mut logger, sink) = memory_logger(10);
    logger.add_sensor(Arc::new(ScriptedSensor::new("thermo").failing_on([1, 2])));

    let mut ok = 0;
    let mut failed = 0;
    for _ in 0..5 {
        match logger.read::<Climate>() {
            Ok(_) => ok += 1,
            Err(TickError::Sensor(SensorError::ReadFailure { sensor, .. })) => {
                assert_eq!(sensor, "thermo");
                failed += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((ok, failed), (3, 2));
    assert_eq!(logger.ref_queue().len(), 3);

    let warnings = logger.system_logger().drain();
    assert_eq!(
        warnings
            .iter()
            .filter(|e| e.to_string().starts_with("tick dropped"))
            .count(),
        2
    );

    logger.close().unwrap();
    assert_eq!(sink.column("thermo-seq"), vec!["0", "3", "4"]);
}

#[test]
fn test_publisher_mismatch_is_a_sensor_error() {
    let (mut logger, _) = memory_logger(10);
    logger.add_sensor(Arc::new(Impostor));
    assert!(matches!(
        logger.read::<Climate>(),
        Err(TickError::Sensor(SensorError::PublisherMismatch { .. }))
    ));
}

#[test]
fn test_same_name_sensor_is_replaced() {
    let (mut logger, _) = memory_logger(10);
    let first = Arc::new(ScriptedSensor::new("thermo"));
    let second = Arc::new(ScriptedSensor::new("thermo"));
    logger.add_sensor(first.clone());
    logger.add_sensor(second.clone());
    assert_eq!(logger.sensor_names(), vec!["thermo"]);

    logger.read::<Climate>().unwrap();
    assert_eq!((first.reads(), second.reads()), (0, 1));
}

#[test]
fn test_removed_sensor_leaves_empty_cells() {
    let (mut logger, sink) = memory_logger(10);
    logger.add_sensor(Arc::new(ScriptedSensor::new("thermo")));
    logger.read::<Climate>().unwrap();

    assert!(logger.remove("thermo").is_some());
    assert!(logger.remove("thermo").is_none());
    logger.read::<Climate>().unwrap();
    logger.close().unwrap();

    assert_eq!(sink.header().unwrap(), vec!["thermo-seq", "thermo-temp"]);
    assert_eq!(sink.rows()[1], vec![String::new(), String::new()]);
}

#[test]
fn test_read_after_close_fails() {
    let (mut logger, _) = memory_logger(10);
    logger.add_sensor(Arc::new(ScriptedSensor::new("thermo")));
    logger.read::<Climate>().unwrap();
    logger.close().unwrap();
    logger.close().unwrap();
    assert!(logger.is_closed());
    assert!(matches!(
        logger.read::<Climate>(),
        Err(TickError::Log(LogError::Closed))
    ));
}

#[test]
fn test_log_file_created_under_configured_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggerConfig {
        dir: dir.path().join("logs"),
        maxlen: 2,
        ..LoggerConfig::default()
    };
    let mut logger = DataLogger::new(config);
    logger.add_sensor(Arc::new(ScriptedSensor::new("thermo")));
    for _ in 0..6 {
        logger.read::<Climate>().unwrap();
    }
    let queue = logger.queue().unwrap();
    logger.close().unwrap();

    let path = queue.path().unwrap().to_path_buf();
    assert!(path.starts_with(dir.path().join("logs")));
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("Climate_") && file_name.ends_with(".csv"));

    let rows = csv::Reader::from_path(&path).unwrap().records().count();
    assert_eq!(rows, 6);
    assert_eq!(queue.written(), 6);
}
