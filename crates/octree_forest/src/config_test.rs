use super::*;

#[test]
fn test_uniform_config_starts_at_its_level() {
  let config = ForestConfig::uniform(3);
  assert_eq!(config.starting_level(1, 4).unwrap(), 3);
}

/// 20 leaves per rank: 2 trees at level 1 give 16, so even one rank needs
/// level 2 (128 leaves), which also suffices for 5 ranks. 16 per rank on one
/// rank stops at level 1.
#[test]
fn test_starting_level_grows_until_enough_leaves() {
  let config = ForestConfig {
    min_octants_per_process: 20,
    min_level: 1,
    fill_uniform: true,
  };
  assert_eq!(config.starting_level(2, 5).unwrap(), 2);
  assert_eq!(config.starting_level(2, 1).unwrap(), 2);
  assert_eq!(config.starting_level(2, 7).unwrap(), 3);

  let config = ForestConfig {
    min_octants_per_process: 16,
    ..config
  };
  assert_eq!(config.starting_level(2, 1).unwrap(), 1);
}

#[test]
fn test_starting_level_rejects_too_fine_level() {
  let config = ForestConfig::uniform(QMAX_LEVEL + 1);
  assert_eq!(
    config.starting_level(1, 1),
    Err(ForestError::LevelOutOfRange {
      level: QMAX_LEVEL + 1,
      max: QMAX_LEVEL
    })
  );
}

#[test]
fn test_starting_level_rejects_impossible_density() {
  let config = ForestConfig {
    min_octants_per_process: u64::MAX,
    min_level: 0,
    fill_uniform: true,
  };
  assert!(matches!(
    config.starting_level(1, 1 << 40),
    Err(ForestError::InvalidConfig(_))
  ));
}

#[test]
fn test_adjacency_direction_counts() {
  for adjacency in [Adjacency::Face, Adjacency::Edge, Adjacency::Corner] {
    let offsets: Vec<_> = adjacency.offsets().collect();
    assert_eq!(offsets.len(), adjacency.num_directions());
    assert!(offsets.iter().all(|o| *o != [0, 0, 0]));
  }
  assert_eq!(Adjacency::default(), Adjacency::Face);
}

#[test]
fn test_inspect_config_defaults_to_notify() {
  let config = InspectConfig::default();
  assert!(!config.use_ranges);
  assert!(!config.use_verify);
  assert_eq!(config.max_ranges, InspectConfig::DEFAULT_MAX_RANGES);
}
