use anyhow::Result;
use candle_core::{Device, Tensor};
use pgrl_agents::{
    Agent, ConfigurableAgent, PPOAgent, ReinforceAgent, TrainingBudget, VanillaPGAgent,
};
use pgrl_core::{
    config::{Config, EnvConfig, NetworkConfig, ObjSpec, PPOConfig},
    error::PgError,
    models::{Model, SurrogatePGModel},
    registry::ObjRegistry,
    rng,
    test_utils::{BanditEnv, test_registry},
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn countdown_config(length: u64) -> Config {
    let mut config = Config::default();
    config.env = Some(EnvConfig {
        obj: ObjSpec {
            func: "countdown".to_owned(),
            args: json!({ "length": length }),
        },
    });
    config.model.policy_nn = NetworkConfig {
        body: vec![16],
        head: vec![],
    };
    config
}

fn value_config() -> Config {
    let mut config = countdown_config(4);
    config.model.value_nn = Some(NetworkConfig {
        body: vec![16],
        head: vec![],
    });
    config.agent.steps_per_batch = 8;
    config.model.ppo = PPOConfig {
        clip_range: 0.2,
        num_epochs: 2,
        mini_batch_size: 4,
    };
    config
}

#[test]
fn update_budget_stops_exactly() -> Result<()> {
    init_tracing();
    rng::seed(0);
    let mut agent = ReinforceAgent::from_config(&countdown_config(3), None, &test_registry())?;
    let mean_reward = agent.train(TrainingBudget::new(5, -1, -1))?;
    assert_eq!(agent.base.model.num_updates(), 5);
    assert_eq!(agent.base.env.num_episodes(), 5);
    assert_eq!(agent.base.env.num_steps(), 15);
    assert_eq!(mean_reward, 3.);
    Ok(())
}

#[test]
fn episode_budget_counts_collected_episodes() -> Result<()> {
    let mut config = countdown_config(2);
    config.agent.episodes_per_batch = 3;
    let mut agent = VanillaPGAgent::from_config(&config, None, &test_registry())?;
    agent.train(TrainingBudget::episodes(6))?;
    assert_eq!(agent.base.model.num_updates(), 2);
    assert_eq!(agent.base.env.num_episodes(), 6);
    Ok(())
}

#[test]
fn timestep_budget_per_batch_collects_whole_episodes() -> Result<()> {
    let mut config = countdown_config(3);
    config.agent.timesteps_per_batch = 4;
    config.agent.episodes_per_batch = -1;
    let mut agent = ReinforceAgent::from_config(&config, None, &test_registry())?;
    let batch = agent.base.generate_batch(4, -1)?;
    assert_eq!(batch.len(), 6);
    assert_eq!(batch.last_state_value(), 0.);
    Ok(())
}

#[test]
fn categorical_actions_are_scalars() -> Result<()> {
    let mut agent = ReinforceAgent::from_config(&countdown_config(3), None, &test_registry())?;
    let action = agent.base.select_action(&Tensor::new(&[0.5f32], &Device::Cpu)?)?;
    assert_eq!(action.rank(), 0);
    assert!(action.to_scalar::<u32>()? < 2);
    Ok(())
}

#[test]
fn env_argument_takes_precedence() -> Result<()> {
    let mut config = countdown_config(3);
    config.env = None;
    let err = ReinforceAgent::from_config(&config, None, &ObjRegistry::new())
        .err()
        .unwrap();
    assert_eq!(err.downcast_ref::<PgError>(), Some(&PgError::MissingEnv));
    // the countdown env in the config resolves to two actions, the explicit bandit to four
    let config = countdown_config(3);
    let from_config = ReinforceAgent::from_config(&config, None, &test_registry())?;
    assert_eq!(from_config.base.env.description().action_size(), 2);
    let agent =
        ReinforceAgent::from_config(&config, Some(Box::new(BanditEnv::new(4, 1))), &test_registry())?;
    assert_eq!(agent.base.env.description().action_size(), 4);
    Ok(())
}

#[test]
fn unknown_env_is_reported() {
    let mut config = countdown_config(3);
    config.env = Some(EnvConfig {
        obj: ObjSpec {
            func: "pendulum".to_owned(),
            args: json!({}),
        },
    });
    let err = ReinforceAgent::from_config(&config, None, &test_registry())
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<PgError>(),
        Some(&PgError::UnknownObject("pendulum".to_owned()))
    );
}

#[test]
fn ppo_collects_fixed_step_batches() -> Result<()> {
    init_tracing();
    rng::seed(1);
    let mut agent: PPOAgent = PPOAgent::from_config(&value_config(), None, &test_registry())?;
    agent.train(TrainingBudget::steps(24))?;
    assert_eq!(agent.base.env.num_steps(), 24);
    assert_eq!(agent.base.model.num_updates(), 3);
    // 8 steps per batch on 4 step episodes never cut an episode
    assert_eq!(agent.base.env.num_episodes(), 6);
    Ok(())
}

#[test]
fn truncated_step_batches_bootstrap() -> Result<()> {
    let mut config = value_config();
    config.agent.steps_per_batch = 6;
    let mut agent: PPOAgent = PPOAgent::from_config(&config, None, &test_registry())?;
    let batch = agent.base.generate_step_batch(6)?;
    assert_eq!(batch.len(), 6);
    assert_eq!(batch.dones(), &[false, false, false, true, false, false]);
    assert_ne!(batch.last_state_value(), 0.);
    assert_eq!(batch.state_values()?.len(), 6);
    Ok(())
}

#[test]
fn episodes_longer_than_a_step_batch_finish() -> Result<()> {
    init_tracing();
    rng::seed(4);
    let mut config = value_config();
    config.env = countdown_config(10).env;
    config.agent.steps_per_batch = 4;
    let mut agent: PPOAgent = PPOAgent::from_config(&config, None, &test_registry())?;
    agent.train(TrainingBudget::new(50, 1, -1))?;
    // the episode ends on step 10, inside the third batch
    assert_eq!(agent.base.model.num_updates(), 3);
    assert_eq!(agent.base.env.num_episodes(), 1);
    assert_eq!(agent.base.env.num_steps(), 12);
    assert_eq!(agent.base.env.rewards(), &[10.]);
    Ok(())
}

#[test]
fn surrogate_model_drives_the_same_agent() -> Result<()> {
    let mut agent: PPOAgent<SurrogatePGModel> =
        PPOAgent::from_config(&value_config(), None, &test_registry())?;
    agent.train(TrainingBudget::updates(2))?;
    assert_eq!(agent.base.model.num_updates(), 2);
    Ok(())
}

#[test]
fn ppo_needs_a_value_network() {
    let err = PPOAgent::<SurrogatePGModel>::from_config(&countdown_config(3), None, &test_registry())
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<PgError>(),
        Some(PgError::InvalidConfig(_))
    ));
}

#[test]
fn agents_load_from_files() -> Result<()> {
    let path = std::env::temp_dir().join("pgrl_agents_from_file.json");
    std::fs::write(
        &path,
        r#"{
            "env": { "obj": { "func": "bandit", "args": { "arms": 3, "best": 2 } } },
            "model": { "policy_nn": { "body": [8] }, "learning_rate": 0.01 },
            "agent": { "gamma": 0.9, "episodes_per_batch": 4 }
        }"#,
    )?;
    let mut agent = ReinforceAgent::from_file(&path, None, &test_registry())?;
    assert_eq!(agent.base.gamma, 0.9);
    agent.train(TrainingBudget::updates(3))?;
    assert_eq!(agent.base.env.num_episodes(), 12);
    std::fs::remove_file(&path)?;
    Ok(())
}
