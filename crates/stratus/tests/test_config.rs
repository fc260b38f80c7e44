use stratus::core::balance::BalanceOptions;
use stratus::core::config::EngineConfig;

#[test]
fn default_config_values() {
    let config = EngineConfig::new();
    assert_eq!(config.workers, 1);
    assert_eq!(config.max_rounds, -1);
    assert_eq!(config.min_score, 1e-9);
    assert_eq!(config.min_gain, 0.01);
    assert_eq!(config.min_gain_limit, 0.1);
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn config_from_file_overrides_some_fields() {
    let config = EngineConfig::from_file("test-configs/engine.yaml");
    assert_eq!(config.workers, 4);
    assert_eq!(config.min_gain, 0.05);
    assert_eq!(config.max_rounds, 100);
    // absent fields keep their defaults
    assert_eq!(config.min_score, 1e-9);
    assert_eq!(config.min_gain_limit, 0.1);
}

#[test]
fn balance_options_inherit_config_tunables() {
    let config = EngineConfig::from_file("test-configs/engine.yaml");
    let opts = BalanceOptions::from_config(&config);
    assert_eq!(opts.workers, 4);
    assert_eq!(opts.min_gain, 0.05);
    assert_eq!(opts.mg_limit, 0.1);
    assert!(opts.disk_moves && opts.inst_moves && !opts.evac_mode);
}
