//! Stat identifiers and their display metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::extract::{ExtractionRule, TransformStep};

const DEFAULT_STATS_DATA: &str = include_str!("../assets/stats.json");

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatParseError {
    #[error("unknown stat identifier `{0}`")]
    Unknown(String),
}

macro_rules! stat_ids {
    ($($variant:ident => $name:literal,)+) => {
        /// Internal stat identifier as used by the game.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum StatId {
            $($variant,)+
        }

        impl StatId {
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for StatId {
            type Err = StatParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(StatParseError::Unknown(s.to_string())),
                }
            }
        }
    };
}

stat_ids! {
    Age => "Age",
    FreighterFleetCombat => "Freighter_Fleet_Combat",
    FreighterFleetExplore => "Freighter_Fleet_Explore",
    FreighterFleetFuel => "Freighter_Fleet_Fuel",
    FreighterFleetMine => "Freighter_Fleet_Mine",
    FreighterFleetSpeed => "Freighter_Fleet_Speed",
    FreighterFleetTrade => "Freighter_Fleet_Trade",
    FreighterHyperdriveJumpDistance => "Freighter_Hyperdrive_JumpDistance",
    FreighterHyperdriveJumpsPerCell => "Freighter_Hyperdrive_JumpsPerCell",
    ShipArmourShieldStrength => "Ship_Armour_Shield_Strength",
    ShipBoost => "Ship_Boost",
    ShipBoostManeuverability => "Ship_BoostManeuverability",
    ShipHyperdriveJumpDistance => "Ship_Hyperdrive_JumpDistance",
    ShipHyperdriveJumpsPerCell => "Ship_Hyperdrive_JumpsPerCell",
    ShipLauncherAutoCharge => "Ship_Launcher_AutoCharge",
    ShipLauncherTakeOffCost => "Ship_Launcher_TakeOffCost",
    ShipManeuverability => "Ship_Maneuverability",
    ShipPulseDriveMiniJumpFuelSpending => "Ship_PulseDrive_MiniJumpFuelSpending",
    ShipWeaponsGunsDamage => "Ship_Weapons_Guns_Damage",
    ShipWeaponsGunsHeatTime => "Ship_Weapons_Guns_HeatTime",
    ShipWeaponsGunsRate => "Ship_Weapons_Guns_Rate",
    ShipWeaponsLasersDamage => "Ship_Weapons_Lasers_Damage",
    ShipWeaponsLasersHeatTime => "Ship_Weapons_Lasers_HeatTime",
    SuitArmourHealth => "Suit_Armour_Health",
    SuitArmourShieldStrength => "Suit_Armour_Shield_Strength",
    SuitDamageReduceCold => "Suit_DamageReduce_Cold",
    SuitDamageReduceHeat => "Suit_DamageReduce_Heat",
    SuitDamageReduceRadiation => "Suit_DamageReduce_Radiation",
    SuitDamageReduceToxic => "Suit_DamageReduce_Toxic",
    SuitEnergy => "Suit_Energy",
    SuitEnergyRegen => "Suit_Energy_Regen",
    SuitJetpackDrain => "Suit_Jetpack_Drain",
    SuitJetpackIgnition => "Suit_Jetpack_Ignition",
    SuitJetpackRefill => "Suit_Jetpack_Refill",
    SuitJetpackTank => "Suit_Jetpack_Tank",
    SuitProtectionCold => "Suit_Protection_Cold",
    SuitProtectionColdDrain => "Suit_Protection_ColdDrain",
    SuitProtectionHeat => "Suit_Protection_Heat",
    SuitProtectionHeatDrain => "Suit_Protection_HeatDrain",
    SuitProtectionRadDrain => "Suit_Protection_RadDrain",
    SuitProtectionRadiation => "Suit_Protection_Radiation",
    SuitProtectionToxDrain => "Suit_Protection_ToxDrain",
    SuitProtectionToxic => "Suit_Protection_Toxic",
    SuitStaminaRecovery => "Suit_Stamina_Recovery",
    SuitStaminaStrength => "Suit_Stamina_Strength",
    SuitUnderwater => "Suit_Underwater",
    Value => "Value",
    VehicleBoostSpeed => "Vehicle_BoostSpeed",
    VehicleBoostTanks => "Vehicle_BoostTanks",
    VehicleEngineFuelUse => "Vehicle_EngineFuelUse",
    VehicleEngineTopSpeed => "Vehicle_EngineTopSpeed",
    VehicleGunDamage => "Vehicle_GunDamage",
    VehicleGunHeatTime => "Vehicle_GunHeatTime",
    VehicleGunRate => "Vehicle_GunRate",
    VehicleLaserDamage => "Vehicle_LaserDamage",
    VehicleLaserHeatTime => "Vehicle_LaserHeatTime",
    VehicleSubBoostSpeed => "Vehicle_SubBoostSpeed",
    WeaponGrenadeBounce => "Weapon_Grenade_Bounce",
    WeaponGrenadeDamage => "Weapon_Grenade_Damage",
    WeaponGrenadeRadius => "Weapon_Grenade_Radius",
    WeaponGrenadeSpeed => "Weapon_Grenade_Speed",
    WeaponLaserChargeTime => "Weapon_Laser_ChargeTime",
    WeaponLaserDamage => "Weapon_Laser_Damage",
    WeaponLaserDrain => "Weapon_Laser_Drain",
    WeaponLaserHeatTime => "Weapon_Laser_HeatTime",
    WeaponLaserMiningSpeed => "Weapon_Laser_Mining_Speed",
    WeaponLaserReloadTime => "Weapon_Laser_ReloadTime",
    WeaponProjectileBurstCap => "Weapon_Projectile_BurstCap",
    WeaponProjectileBurstCooldown => "Weapon_Projectile_BurstCooldown",
    WeaponProjectileClipSize => "Weapon_Projectile_ClipSize",
    WeaponProjectileDamage => "Weapon_Projectile_Damage",
    WeaponProjectileRate => "Weapon_Projectile_Rate",
    WeaponProjectileReloadTime => "Weapon_Projectile_ReloadTime",
    WeaponScanDiscoveryCreature => "Weapon_Scan_Discovery_Creature",
    WeaponScanDiscoveryFlora => "Weapon_Scan_Discovery_Flora",
    WeaponScanRadius => "Weapon_Scan_Radius",
}

impl fmt::Display for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for StatId {
    type Error = StatParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StatId> for String {
    fn from(value: StatId) -> Self {
        value.as_str().to_string()
    }
}

/// Display metadata for one stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatMeta {
    pub display_name: String,
    pub rule: ExtractionRule,
    /// Steps from a raw bonus to the displayed value. `None` means unknown.
    #[serde(default)]
    pub transform: Option<Vec<TransformStep>>,
}

/// Static mapping from stat identifiers to display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatTable {
    entries: BTreeMap<StatId, StatMeta>,
}

impl StatTable {
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or names an unknown stat.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn load_from_static() -> Self {
        Self::from_json(DEFAULT_STATS_DATA).unwrap_or_default()
    }

    #[must_use]
    pub fn embedded() -> &'static Self {
        static TABLE: OnceLock<StatTable> = OnceLock::new();
        TABLE.get_or_init(Self::load_from_static)
    }

    #[must_use]
    pub fn get(&self, stat: StatId) -> Option<&StatMeta> {
        self.entries.get(&stat)
    }

    /// Extraction rule declared for `stat`, if it has metadata.
    #[must_use]
    pub fn rule(&self, stat: StatId) -> Option<ExtractionRule> {
        self.get(stat).map(|meta| meta.rule)
    }

    #[must_use]
    pub fn display_name(&self, stat: StatId) -> &str {
        self.get(stat)
            .map_or_else(|| stat.as_str(), |meta| meta.display_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatId, &StatMeta)> {
        self.entries.iter().map(|(id, meta)| (*id, meta))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert a raw bonus into its displayed value, warning when no
    /// transform is known for the stat.
    #[must_use]
    pub fn transform_raw(&self, stat: StatId, bonus: f64) -> f64 {
        match self.get(stat).and_then(|meta| meta.transform.as_deref()) {
            Some(steps) => crate::extract::apply_transform(steps, bonus),
            None => {
                log::warn!("no transform known for {stat} (raw {bonus})");
                bonus
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_round_trip_through_strings() {
        for stat in StatId::ALL {
            assert_eq!(stat.as_str().parse::<StatId>(), Ok(*stat));
        }
        assert_eq!(
            "Suit_Jetpack_Fuel".parse::<StatId>(),
            Err(StatParseError::Unknown("Suit_Jetpack_Fuel".to_string()))
        );
    }

    #[test]
    fn declaration_order_matches_column_order() {
        let mut sorted: Vec<&str> = StatId::ALL.iter().map(|s| s.as_str()).collect();
        sorted.sort_unstable();
        let declared: Vec<&str> = StatId::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(sorted, declared);
    }

    #[test]
    fn embedded_table_covers_every_stat() {
        let table = StatTable::embedded();
        assert_eq!(table.len(), StatId::ALL.len());
        assert_eq!(
            table.display_name(StatId::SuitJetpackIgnition),
            "Initial Boost Power"
        );
        assert_eq!(
            table.get(StatId::ShipHyperdriveJumpDistance).map(|m| m.rule),
            Some(ExtractionRule::LightyearDistance)
        );
    }

    #[test]
    fn unknown_stat_in_json_is_rejected() {
        let json = r#"{"Suit_Unknown": {"display_name": "X", "rule": "percent"}}"#;
        assert!(StatTable::from_json(json).is_err());
    }

    #[test]
    fn raw_bonus_uses_transform() {
        let table = StatTable::embedded();
        let shield = table.transform_raw(StatId::SuitArmourShieldStrength, 0.32);
        assert!((shield - 32.0).abs() < 1e-9);
        let distance = table.transform_raw(StatId::ShipHyperdriveJumpDistance, 250.5);
        assert!((distance - 250.5).abs() < f64::EPSILON);
    }
}
