//! CLI settings: parameter profiles and per-network deployments.
//!
//! Built-in defaults are layered under an optional TOML file and `OSMOTIC__*`
//! environment variables. Profiles and networks from the file are added to
//! (or replace) the built-in entries of the same name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use osmotic_core::constants::{
    AP_1_MONTH, DEFAULT_DECAY, DEFAULT_MAX_RATIO, DEFAULT_WEIGHT, FIXED_POINT_SCALE, FUNDING_DECAY,
    FUNDING_MAX_RATIO, FUNDING_MIN_STAKE_RATIO, LEGACY_DECAY, LEGACY_MAX_RATIO,
    LEGACY_PARAMETER_SCALE, LEGACY_WEIGHT,
};
use osmotic_core::error::SettingsError;
use osmotic_core::{DecayParameters, FixedPoint, Threshold};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Chain used when a chain id has no entry (Polygon Mumbai).
pub const FALLBACK_CHAIN_ID: u64 = 80_001;

/// Environment variable prefix, e.g. `OSMOTIC__DEFAULT_PROFILE=funding`.
pub const ENV_PREFIX: &str = "OSMOTIC";

/// One parameter set, as integers in its own `scale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    /// Denominator of every other field (10^7 or 10^18).
    pub scale: u64,
    pub decay: u64,
    pub max_ratio: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stake_ratio: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
}

impl ProfileSettings {
    fn wad(decay: u128, max_ratio: u128, threshold: ProfileThreshold) -> Self {
        Self::scaled(FIXED_POINT_SCALE, decay, max_ratio, threshold)
    }

    fn scaled(scale: u128, decay: u128, max_ratio: u128, threshold: ProfileThreshold) -> Self {
        let (min_stake_ratio, weight) = match threshold {
            ProfileThreshold::MinStakeRatio(v) => (Some(v as u64), None),
            ProfileThreshold::Weight(v) => (None, Some(v as u64)),
        };
        Self {
            scale: scale as u64,
            decay: decay as u64,
            max_ratio: max_ratio as u64,
            min_stake_ratio,
            weight,
        }
    }

    /// Rescale to 10^18 and validate.
    pub fn to_parameters(&self, name: &str) -> Result<DecayParameters, SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidProfile {
            name: name.to_string(),
            reason,
        };
        let rescale = |value: u64| {
            FixedPoint::from_scaled(u128::from(value), u128::from(self.scale))
                .map_err(|e| invalid(e.to_string()))
        };

        let threshold = match (self.min_stake_ratio, self.weight) {
            (Some(ratio), None) => Threshold::MinStakeRatio(rescale(ratio)?),
            (None, Some(weight)) => Threshold::Weight(rescale(weight)?),
            _ => {
                return Err(invalid(
                    "exactly one of min_stake_ratio and weight must be set".to_string(),
                ));
            }
        };
        DecayParameters::new(rescale(self.decay)?, rescale(self.max_ratio)?, threshold)
            .map_err(|e| invalid(e.to_string()))
    }
}

enum ProfileThreshold {
    MinStakeRatio(u128),
    Weight(u128),
}

/// Where the funding contracts of one chain live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub name: String,
    pub host: String,
    pub cfav1: String,
    pub request_token: String,
    /// Profile used on this chain when none is given explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl NetworkSettings {
    fn new(name: &str, host: &str, cfav1: &str, request_token: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            cfav1: cfav1.to_string(),
            request_token: request_token.to_string(),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub default_profile: String,
    pub profiles: BTreeMap<String, ProfileSettings>,
    /// Keyed by chain id.
    pub networks: BTreeMap<String, NetworkSettings>,
}

/// The file/environment layer. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsLayer {
    default_profile: Option<String>,
    profiles: BTreeMap<String, ProfileSettings>,
    networks: BTreeMap<String, NetworkSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let profiles = BTreeMap::from([
            (
                "osmotic".to_string(),
                ProfileSettings::wad(
                    DEFAULT_DECAY,
                    DEFAULT_MAX_RATIO,
                    ProfileThreshold::Weight(DEFAULT_WEIGHT),
                ),
            ),
            (
                "osmotic-1e7".to_string(),
                ProfileSettings::scaled(
                    LEGACY_PARAMETER_SCALE,
                    LEGACY_DECAY,
                    LEGACY_MAX_RATIO,
                    ProfileThreshold::Weight(LEGACY_WEIGHT),
                ),
            ),
            (
                "fluid".to_string(),
                ProfileSettings::wad(
                    AP_1_MONTH,
                    FUNDING_MAX_RATIO,
                    ProfileThreshold::MinStakeRatio(FUNDING_MIN_STAKE_RATIO),
                ),
            ),
            (
                "funding".to_string(),
                ProfileSettings::wad(
                    FUNDING_DECAY,
                    FUNDING_MAX_RATIO,
                    ProfileThreshold::MinStakeRatio(FUNDING_MIN_STAKE_RATIO),
                ),
            ),
        ]);

        let networks = BTreeMap::from([
            (
                "5".to_string(),
                NetworkSettings::new(
                    "goerli",
                    "0x22ff293e14F1EC3A09B137e9e06084AFd63adDF9",
                    "0xEd6BcbF6907D4feEEe8a8875543249bEa9D308E8",
                    "0xF2d68898557cCb2Cf4C10c3Ef2B034b2a69DAD00",
                ),
            ),
            (
                "100".to_string(),
                NetworkSettings::new(
                    "xdai",
                    "0x2dFe937cD98Ab92e59cF3139138f18c823a4efE7",
                    "0xEbdA4ceF883A7B12c4E669Ebc58927FBa8447C7D",
                    "0x59988e47A3503AaFaA0368b9deF095c818Fdca01",
                ),
            ),
            (
                "137".to_string(),
                NetworkSettings::new(
                    "polygon",
                    "0x3E14dC1b13c488a8d5D310918780c983bD5982E7",
                    "0x6EeE6060f715257b970700bc2656De21dEdF074C",
                    "0x1305F6B6Df9Dc47159D12Eb7aC2804d4A33173c2",
                ),
            ),
            (
                FALLBACK_CHAIN_ID.to_string(),
                NetworkSettings::new(
                    "mumbai",
                    "0xEB796bdb90fFA0f28255275e16936D25d3418603",
                    "0x49e565Ed1bdc17F3d220f72DF0857C26FA83F873",
                    "0x5D8B4C2554aeB7e86F387B4d6c00Ac33499Ed01f",
                ),
            ),
        ]);

        Self {
            default_profile: "osmotic".to_string(),
            profiles,
            networks,
        }
    }
}

impl Settings {
    /// `<config dir>/osmotic/settings.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("osmotic")
            .join("settings.toml")
    }

    /// Load the built-ins overlaid with `path` (required when given, optional
    /// at [`default_path`](Self::default_path) otherwise) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        debug!(path = %path.display(), required, "loading settings");

        let layer: SettingsLayer = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| SettingsError::Load(e.to_string()))?;

        let mut settings = Self::default();
        settings.apply(layer);
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&mut self, layer: SettingsLayer) {
        if let Some(default_profile) = layer.default_profile {
            self.default_profile = default_profile;
        }
        self.profiles.extend(layer.profiles);
        self.networks.extend(layer.networks);
    }

    /// Every profile converts, and every profile reference resolves.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, profile) in &self.profiles {
            profile.to_parameters(name)?;
        }
        self.profile_settings(&self.default_profile)?;
        for network in self.networks.values() {
            if let Some(profile) = &network.profile {
                self.profile_settings(profile)?;
            }
        }
        Ok(())
    }

    fn profile_settings(&self, name: &str) -> Result<&ProfileSettings, SettingsError> {
        self.profiles
            .get(name)
            .ok_or_else(|| SettingsError::UnknownProfile(name.to_string()))
    }

    pub fn profile(&self, name: &str) -> Result<DecayParameters, SettingsError> {
        self.profile_settings(name)?.to_parameters(name)
    }

    pub fn network(&self, chain_id: u64) -> Result<&NetworkSettings, SettingsError> {
        self.networks
            .get(&chain_id.to_string())
            .ok_or(SettingsError::UnknownNetwork(chain_id))
    }

    /// The chain's network, or the fallback chain's when it has none.
    pub fn network_or_fallback(&self, chain_id: u64) -> Result<(u64, &NetworkSettings), SettingsError> {
        match self.network(chain_id) {
            Ok(network) => Ok((chain_id, network)),
            Err(_) => {
                warn!(chain_id, fallback = FALLBACK_CHAIN_ID, "unknown chain, using fallback network");
                self.network(FALLBACK_CHAIN_ID)
                    .map(|network| (FALLBACK_CHAIN_ID, network))
            }
        }
    }

    /// Pick the active profile: explicit name, then the chain's profile, then
    /// the default.
    pub fn resolve_profile(
        &self,
        profile: Option<&str>,
        chain_id: Option<u64>,
    ) -> Result<(String, DecayParameters), SettingsError> {
        let name = match (profile, chain_id) {
            (Some(name), _) => name.to_string(),
            (None, Some(chain_id)) => {
                let (_, network) = self.network_or_fallback(chain_id)?;
                network
                    .profile
                    .clone()
                    .unwrap_or_else(|| self.default_profile.clone())
            }
            (None, None) => self.default_profile.clone(),
        };
        let params = self.profile(&name)?;
        Ok((name, params))
    }
}
