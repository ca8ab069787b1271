//! Forecast layer catalog
//!
//! Maps every GeoMet layer the pipeline samples to the rule used to reduce its
//! raw time series into daily values, plus the label used for column headers.
//! Two profiles exist because the labelled and compact output formats disagree
//! on column naming, the snow rule and the snapshot hour of lagged layers.

use chrono::NaiveTime;
use clap::ValueEnum;
use serde::Serialize;

/// Per-sample transform applied before taking a daily mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueTransform {
    /// Compass degrees to the station's `wind_in` / `wind_out` label
    WindDirection,
    /// Speed in m/s to an ordinal band (C, L, M, S, X)
    WindSpeed,
}

/// One output band of a scaled daily sum
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SumBand {
    pub suffix: &'static str,
    pub divisor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AggregationKind {
    MinMax,
    Mean,
    Sum,
    ScaledSum(&'static [SumBand]),
    ModeWithTransform(ValueTransform),
    LaggedSnapshot {
        lag_days: i64,
        time_of_day: NaiveTime,
    },
}

/// Statistic a single output column carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Min,
    Max,
    Mean,
    Total,
    Band(&'static str),
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogProfile {
    /// Descriptive headers, snow split into 5%/10% bands, snapshots at 08:00
    Labelled,
    /// Layer-id headers, snow as a plain total, snapshots at 00:00
    Compact,
}

impl CatalogProfile {
    pub fn snapshot_time(self) -> NaiveTime {
        match self {
            CatalogProfile::Labelled => NaiveTime::from_hms_opt(8, 0, 0),
            CatalogProfile::Compact => NaiveTime::from_hms_opt(0, 0, 0),
        }
        .unwrap_or(NaiveTime::MIN)
    }

    pub fn naming(self) -> ColumnNaming {
        match self {
            CatalogProfile::Labelled => ColumnNaming::Label,
            CatalogProfile::Compact => ColumnNaming::Identifier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnNaming {
    Label,
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: AggregationKind,
}

impl Layer {
    /// Header for one statistic of this layer under the given naming scheme
    pub fn column_name(&self, naming: ColumnNaming, statistic: Statistic) -> String {
        match naming {
            ColumnNaming::Label => match statistic {
                Statistic::Min => format!("{} Min", self.label),
                Statistic::Max => format!("{} Max", self.label),
                Statistic::Mean => format!("{} Mean", self.label),
                Statistic::Total => format!("{} Total", self.label),
                Statistic::Band(suffix) => format!("{} {}", self.label, suffix),
                Statistic::Value => self.label.to_string(),
            },
            ColumnNaming::Identifier => match statistic {
                Statistic::Min => format!("{}_min", self.id),
                Statistic::Max => format!("{}_max", self.id),
                Statistic::Mean => format!("{}_mean", self.id),
                Statistic::Total => format!("{}_total", self.id),
                Statistic::Band(suffix) => format!("{}_{}", self.id, suffix),
                Statistic::Value => self.id.to_string(),
            },
        }
    }

    /// Statistics this layer emits, in output order
    pub fn statistics(&self) -> Vec<Statistic> {
        match self.kind {
            AggregationKind::MinMax => vec![Statistic::Min, Statistic::Max],
            AggregationKind::Mean => vec![Statistic::Mean],
            AggregationKind::Sum => vec![Statistic::Total],
            AggregationKind::ScaledSum(bands) => {
                bands.iter().map(|b| Statistic::Band(b.suffix)).collect()
            }
            AggregationKind::ModeWithTransform(_) | AggregationKind::LaggedSnapshot { .. } => {
                vec![Statistic::Value]
            }
        }
    }
}

/// Snow accumulation expressed as two probability-style bands
pub const SNOW_BANDS: &[SumBand] = &[
    SumBand {
        suffix: "5%",
        divisor: 50.0,
    },
    SumBand {
        suffix: "10%",
        divisor: 100.0,
    },
];

const MIN_MAX: &[(&str, &str)] = &[
    ("GEPS.DIAG.3_TT.ERMEAN", "Air temperature at 2 m above ground [°C] (mean)"),
    ("GEPS.DIAG.3_TT.ERC25", "Air temperature at 2 m above ground [°C] (25th percentile)"),
    ("GEPS.DIAG.3_TT.ERC75", "Air temperature at 2 m above ground [°C] (75th percentile)"),
    ("GEPS.DIAG.3_WCF.ERMEAN", "Wind chill factor at 2 m above ground [°C] (mean)"),
];

const LAGGED: &[(&str, &str)] = &[
    ("GEPS.DIAG.24_PRMM.ERGE1", "Quantity of precipitation >= 1 mm [probability %]"),
    ("GEPS.DIAG.24_RNMM.ERGE1", "Rain >= 1 mm [probability %]"),
    ("GEPS.DIAG.24_RNMM.ERGE10", "Rain >= 10 mm [probability %]"),
    ("GEPS.DIAG.24_RNMM.ERGE25", "Rain >= 25 mm [probability %]"),
    ("GEPS.DIAG.24_RNMM.ERMEAN", "Rain (mean)"),
    ("GEPS.DIAG.24_RNMM.ERC25", "Rain (25th percentile)"),
    ("GEPS.DIAG.24_RNMM.ERC75", "Rain (75th percentile)"),
    ("GEPS.DIAG.24_SNMM.ERGE1", "Snow >= 1 mm [probability %]"),
    ("GEPS.DIAG.24_SNMM.ERGE10", "Snow >= 10 mm [probability %]"),
    ("GEPS.DIAG.24_SNMM.ERGE25", "Snow >= 25 mm [probability %]"),
    ("GEPS.DIAG.24_SNMM.ERMEAN", "Snow (mean)"),
    ("GEPS.DIAG.24_SNMM.ERC25", "Snow (25th percentile)"),
    ("GEPS.DIAG.24_SNMM.ERC75", "Snow (75th percentile)"),
];

/// Immutable table of the layers sampled for every station
#[derive(Debug, Clone)]
pub struct LayerCatalog {
    profile: CatalogProfile,
    layers: Vec<Layer>,
}

impl LayerCatalog {
    pub fn for_profile(profile: CatalogProfile) -> Self {
        let snow_kind = match profile {
            CatalogProfile::Labelled => AggregationKind::ScaledSum(SNOW_BANDS),
            CatalogProfile::Compact => AggregationKind::Sum,
        };
        let lagged_kind = AggregationKind::LaggedSnapshot {
            lag_days: 1,
            time_of_day: profile.snapshot_time(),
        };

        let mut layers = vec![
            Layer {
                id: "GDPS.ETA_TT",
                label: "Air temperature [°C]",
                kind: AggregationKind::MinMax,
            },
            Layer {
                id: "GDPS.ETA_PN-SLP",
                label: "Sea level pressure [Pa]",
                kind: AggregationKind::Mean,
            },
            Layer {
                id: "GDPS.ETA_HR",
                label: "Relative humidity [%]",
                kind: AggregationKind::Mean,
            },
            Layer {
                id: "GDPS.ETA_RN",
                label: "Rain accumulation [kg/(m^2)]",
                kind: AggregationKind::Sum,
            },
            Layer {
                id: "GDPS.ETA_SN",
                label: "Snow accumulation [kg/(m^2)]",
                kind: snow_kind,
            },
            Layer {
                id: "GDPS.PRES_WD.800.3h",
                label: "Wind direction at 850.0 mb (3 hourly forecast) [°]",
                kind: AggregationKind::ModeWithTransform(ValueTransform::WindDirection),
            },
            Layer {
                id: "GDPS.PRES_WSPD.800.3h",
                label: "Winds at 800.0 mb (3 hourly forecast) [m/s]",
                kind: AggregationKind::ModeWithTransform(ValueTransform::WindSpeed),
            },
        ];
        layers.extend(MIN_MAX.iter().map(|&(id, label)| Layer {
            id,
            label,
            kind: AggregationKind::MinMax,
        }));
        layers.extend(LAGGED.iter().map(|&(id, label)| Layer {
            id,
            label,
            kind: lagged_kind,
        }));

        Self { profile, layers }
    }

    /// Catalog restricted to a subset of layer ids, keeping catalog order
    pub fn with_layers(profile: CatalogProfile, ids: &[&str]) -> Self {
        let mut catalog = Self::for_profile(profile);
        catalog.layers.retain(|layer| ids.contains(&layer.id));
        catalog
    }

    pub fn profile(&self) -> CatalogProfile {
        self.profile
    }

    pub fn naming(&self) -> ColumnNaming {
        self.profile.naming()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, layer_id: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == layer_id)
    }

    /// # Panics
    ///
    /// Panics if `layer_id` is not in the catalog.
    pub fn aggregation_kind_for(&self, layer_id: &str) -> AggregationKind {
        self.layer(layer_id).kind
    }

    /// # Panics
    ///
    /// Panics if `layer_id` is not in the catalog.
    pub fn label_for(&self, layer_id: &str) -> &'static str {
        self.layer(layer_id).label
    }

    fn layer(&self, layer_id: &str) -> &Layer {
        self.get(layer_id)
            .unwrap_or_else(|| panic!("layer {layer_id} is not in the {:?} catalog", self.profile))
    }
}
