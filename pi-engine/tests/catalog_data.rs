use pi_engine::{Catalog, ItemKey, OverrideRegistry, PRODUCT_PREFIX, StatId, StatTable, Tier};

#[test]
fn embedded_catalog_validates_against_stat_table() {
    let catalog = Catalog::embedded();
    catalog.validate(StatTable::embedded()).unwrap();
    assert!(!catalog.items.is_empty());
}

#[test]
fn product_ids_carry_the_product_prefix() {
    for item in &Catalog::embedded().items {
        assert_eq!(
            item.family.is_product(),
            item.item_id.starts_with(PRODUCT_PREFIX),
            "{}",
            item.item_id
        );
    }
}

#[test]
fn every_compendium_tier_is_defined_and_ranked_from_one() {
    for item in &Catalog::embedded().items {
        let tiers = item.compendium_tiers();
        assert!(!tiers.is_empty(), "{}", item.item_id);
        for (idx, tier) in tiers.iter().enumerate() {
            assert_eq!(tier.rank, idx + 1);
            assert!(tier.spec.stats.len() >= tier.spec.max_stats, "{}", tier.key());
        }
    }
}

#[test]
fn configured_ranges_are_ordered() {
    for tier in Catalog::embedded().tiers() {
        for spec in &tier.spec.stats {
            if let Some(range) = spec.range {
                assert!(range.min <= range.max, "{} {}", tier.key(), spec.stat);
            }
        }
    }
}

#[test]
fn guessed_grenade_radius_is_flagged() {
    let catalog = Catalog::embedded();
    let tier = catalog.tier(&ItemKey::new("UP_TGREN", Tier::Two)).unwrap();
    assert!(tier.spec.unverified);
    let radius = tier
        .spec
        .spec(StatId::WeaponGrenadeRadius)
        .and_then(|spec| spec.range)
        .unwrap();
    assert_eq!((radius.min, radius.max), (21.0, 30.0));
}

#[test]
fn shipped_overrides_target_configured_items() {
    let catalog = Catalog::embedded();
    let registry = OverrideRegistry::from_catalog(catalog);
    assert!(!registry.for_item(&ItemKey::new("UP_JET", Tier::X)).is_empty());
    assert!(!registry.for_item(&ItemKey::new("UP_BOLT", Tier::Four)).is_empty());
    assert!(registry.for_item(&ItemKey::new("UP_SHLD", Tier::X)).is_empty());
}
