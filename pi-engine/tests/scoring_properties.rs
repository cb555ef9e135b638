use pi_engine::{
    Catalog, Inventory, ItemFamily, ItemKey, SampleRow, StatId, StatSpec, Tier, TierSpec,
    compute_weights, score_table,
};

fn shield_rows(values: &[f64]) -> Vec<SampleRow> {
    values
        .iter()
        .zip(0..)
        .map(|(value, seed)| SampleRow::new(seed).with_stat(StatId::SuitArmourShieldStrength, *value))
        .collect()
}

fn perfections(rows: &[SampleRow]) -> Vec<f64> {
    rows.iter().map(|row| row.perfection).collect()
}

#[test]
fn configured_range_maps_ends_to_zero_and_one() {
    let catalog = Catalog::embedded();
    let tier = catalog.tier(&ItemKey::new("UP_SHLD", Tier::One)).unwrap();
    let mut rows = shield_rows(&[95.0, 90.0, 92.5]);
    let score = score_table(&mut rows, tier.spec, tier.family(), 3);
    assert_eq!(perfections(&rows), vec![1.0, 0.0, 0.5]);
    assert_eq!(score.max_stats_possible, 1);
    assert!(score.unconfigured.is_empty());
}

#[test]
fn sole_shield_stat_scores_linearly_across_its_range() {
    let spec = TierSpec {
        tier: Tier::One,
        max_stats: 2,
        stats: vec![
            StatSpec::ranged(StatId::SuitArmourShieldStrength, 5.0, 10.0),
            StatSpec {
                always_same: true,
                ..StatSpec::ranged(StatId::SuitArmourHealth, 33.0, 33.0)
            },
        ],
        unverified: false,
    };
    let family = ItemFamily::Technology {
        inventory: Inventory::Suit,
    };
    let mut rows = shield_rows(&[10.0, 5.0, 7.5]);
    let score = score_table(&mut rows, &spec, family, 3);
    assert_eq!(perfections(&rows), vec![1.0, 0.0, 0.5]);
    assert_eq!(score.max_stats_possible, 1);
}

#[test]
fn always_same_stats_do_not_dilute_perfection() {
    let catalog = Catalog::embedded();
    let tier = catalog.tier(&ItemKey::new("UP_SHLD", Tier::One)).unwrap();
    let mut rows = vec![
        SampleRow::new(0)
            .with_stat(StatId::SuitArmourShieldStrength, 95.0)
            .with_stat(StatId::SuitArmourHealth, 33.0),
        SampleRow::new(1).with_stat(StatId::SuitArmourShieldStrength, 95.0),
    ];
    score_table(&mut rows, tier.spec, tier.family(), 3);
    assert_eq!(perfections(&rows), vec![1.0, 1.0]);
}

#[test]
fn out_of_range_values_are_not_clamped() {
    let catalog = Catalog::embedded();
    let tier = catalog.tier(&ItemKey::new("UP_SHLD", Tier::One)).unwrap();
    let mut rows = shield_rows(&[96.0]);
    score_table(&mut rows, tier.spec, tier.family(), 3);
    assert_eq!(perfections(&rows), vec![1.2]);
}

#[test]
fn products_rescale_over_observed_value_range() {
    let catalog = Catalog::embedded();
    let tier = catalog
        .tier(&ItemKey::new("PROC_LOOT", Tier::Untiered))
        .unwrap();
    let mut rows: Vec<SampleRow> = [(115_000.0, 3.0), (2_299_932.0, 9_000.0), (1_207_466.0, 50.0)]
        .into_iter()
        .zip(0..)
        .map(|((value, age), seed)| {
            SampleRow::new(seed)
                .with_stat(StatId::Value, value)
                .with_stat(StatId::Age, age)
        })
        .collect();
    let score = score_table(&mut rows, tier.spec, tier.family(), 5);
    assert_eq!(score.strategy, "empirical-range-unweighted");
    assert_eq!(perfections(&rows), vec![0.0, 1.0, 0.5]);
}

#[test]
fn missing_stats_scale_by_presence() {
    let spec = TierSpec {
        tier: Tier::Three,
        max_stats: 3,
        stats: vec![
            StatSpec::ranged(StatId::WeaponGrenadeDamage, 0.0, 10.0),
            StatSpec::ranged(StatId::WeaponGrenadeRadius, 0.0, 10.0),
            StatSpec::ranged(StatId::WeaponGrenadeSpeed, 0.0, 10.0),
        ],
        unverified: false,
    };
    let family = ItemFamily::Technology {
        inventory: Inventory::Weapon,
    };
    let mut rows = vec![
        SampleRow::new(0)
            .with_stat(StatId::WeaponGrenadeDamage, 10.0)
            .with_stat(StatId::WeaponGrenadeRadius, 10.0)
            .with_stat(StatId::WeaponGrenadeSpeed, 10.0),
        SampleRow::new(1)
            .with_stat(StatId::WeaponGrenadeDamage, 10.0)
            .with_stat(StatId::WeaponGrenadeRadius, 10.0),
    ];
    let score = score_table(&mut rows, &spec, family, 3);
    assert_eq!(score.max_stats_possible, 3);
    assert_eq!(perfections(&rows), vec![1.0, 0.667]);
}

#[test]
fn weights_are_relative_to_the_narrowest_range() {
    for tier in Catalog::embedded().tiers() {
        let weights = compute_weights(&tier.spec.stats);
        if weights.is_empty() {
            continue;
        }
        let min = weights
            .iter()
            .map(|(_, weight)| weight)
            .fold(f64::INFINITY, f64::min);
        assert!((min - 1.0).abs() < f64::EPSILON, "{}", tier.key());
        assert!(weights.iter().all(|(_, weight)| weight >= 1.0));
    }
}

#[test]
fn rescoring_is_idempotent_for_every_tier() {
    for tier in Catalog::embedded().tiers() {
        let mut rows: Vec<SampleRow> = (0..4_u32)
            .map(|seed| {
                let mut row = SampleRow::new(seed);
                for spec in &tier.spec.stats {
                    let value = spec.range.map_or(f64::from(seed), |range| {
                        range.min + range.width() * f64::from(seed) / 3.0
                    });
                    row.stats.insert(spec.stat, value);
                }
                row
            })
            .collect();
        score_table(&mut rows, tier.spec, tier.family(), 3);
        let first = perfections(&rows);
        score_table(&mut rows, tier.spec, tier.family(), 3);
        assert_eq!(first, perfections(&rows), "{}", tier.key());
    }
}
