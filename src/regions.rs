//! Eco-region classification of a polygon from a land-cover raster.
//!
//! The raster's per-class pixel histogram over the polygon is normalized to
//! percentages and the largest share is reported as the dominant region.
//! Classification never fails the request: missing coverage and upstream
//! errors become tagged outcomes with sentinel names on the wire.

use tracing::{debug, warn};

use crate::archive::{HistogramRequest, LandCoverSource};
use crate::geometry::Polygon;
use crate::models::{OutcomeStatus, RegionPercentage};

pub const NO_COVERAGE_NAME: &str = "No coverage detected";
pub const ERROR_NAME: &str = "Error";
pub const UNKNOWN_NAME: &str = "Unknown";

/// Vegetation units of the land-cover raster, keyed by raster class code.
pub const ECO_REGIONS: [(u16, &str); 50] = [
    (1, "Selva Montana y Bosque de Aliso y Pino del cerro"),
    (2, "Selva de Transicion"),
    (3, "Selva Misionera-Selva Paranaense"),
    (4, "Valle del Parana"),
    (5, "Delta del Parana"),
    (6, "Prepuna"),
    (7, "Chaco Serrano"),
    (8, "Pastizales de Altura"),
    (9, "Chaco Arido"),
    (10, "Salinas Grandes"),
    (11, "Banados de Mar Chiquita-Espartillares y zampales"),
    (12, "Chaco Semiarido"),
    (13, "Chaco Subhumedo"),
    (14, "Chaco Humedo con Bosques, Pajonales y Palmares de Caranday"),
    (15, "Chaco Humedo con Bosques y Canadas"),
    (16, "Bajos Submeridionales-Espartillares"),
    (17, "Pajonales y Palmares de Yatay"),
    (18, "Esteros del Ibera"),
    (19, "Nandubayzal y Selva de Montiel"),
    (20, "Espinillar"),
    (21, "Algarrobal"),
    (22, "Caldenal"),
    (23, "Monte de Sierras y Bolsones"),
    (24, "Bolsones Endorreicos"),
    (25, "Monte Austral o Tipico"),
    (26, "Monte Oriental o de Transicion"),
    (27, "Campos y Urundayzales"),
    (28, "Malezales"),
    (29, "Pampa Mesopotamica"),
    (30, "Pampa Ondulada"),
    (31, "Pampa Interior Plana"),
    (32, "Pampa Interior Occidental"),
    (33, "Pampa Deprimida"),
    (34, "Pampa Austral"),
    (35, "Puna"),
    (36, "Provincia Altoandina"),
    (37, "Distrito de la Payunia"),
    (38, "Distrito Subandino-Estepa de coiron blanco"),
    (39, "Distrito Occidental"),
    (40, "Distrito Central-Estepa arbustiva de quilenbai"),
    (41, "Distrito Central-Estepa arbustiva serrana"),
    (42, "Distrito Central-Erial"),
    (43, "Distrito del Golfo San Jorge"),
    (44, "Distrito Central"),
    (45, "Estepa arbustiva de mata negra"),
    (46, "Distrito Subandino-Estepa magallanica seca"),
    (47, "Distrito Fueguino-Estepa magallanica humeda"),
    (48, "Ecotono Rionegrino"),
    (49, "Ecotono de la Peninsula de Valdes"),
    (50, "Bosques Andino-Patagonicos"),
];

/// Tunables for the land-cover reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSettings {
    // ---
    pub asset: String,
    pub band: String,
    pub scale: u32,
    pub max_pixels: u64,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            asset: String::new(),
            band: "b1".to_string(),
            scale: 30,
            max_pixels: 1_000_000_000,
        }
    }
}

/// A histogram key resolved against [`ECO_REGIONS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionClass {
    // ---
    Known { code: u16, name: &'static str },
    Unknown { key: String },
}

impl RegionClass {
    /// Resolve a histogram key such as `"25"` or `"25.0"`.
    pub fn from_key(key: &str) -> Self {
        // ---
        let code = key
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u16::MAX as f64)
            .map(|v| v as u16);

        match code.and_then(|c| ECO_REGIONS.iter().find(|(k, _)| *k == c)) {
            Some(&(code, name)) => RegionClass::Known { code, name },
            None => RegionClass::Unknown {
                key: key.to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegionClass::Known { name, .. } => name,
            RegionClass::Unknown { .. } => UNKNOWN_NAME,
        }
    }
}

/// Outcome of classifying one polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    // ---
    Classified {
        dominant: RegionPercentage,
        all: Vec<RegionPercentage>,
    },
    NoCoverage,
    Failed {
        cause: String,
    },
}

impl Classification {
    /// Wire form: dominant region, all regions and the outcome tag.
    pub fn into_parts(self) -> (RegionPercentage, Vec<RegionPercentage>, OutcomeStatus) {
        // ---
        match self {
            Classification::Classified { dominant, all } => (dominant, all, OutcomeStatus::Ok),
            Classification::NoCoverage => (
                RegionPercentage {
                    name: NO_COVERAGE_NAME.to_string(),
                    percentage: 0.0,
                },
                Vec::new(),
                OutcomeStatus::Empty,
            ),
            Classification::Failed { cause } => (
                RegionPercentage {
                    name: ERROR_NAME.to_string(),
                    percentage: 0.0,
                },
                Vec::new(),
                OutcomeStatus::Failed { cause },
            ),
        }
    }
}

/// Normalize a class histogram into percentages and pick the dominant class.
///
/// Ties go to the class met first in `histogram` order. A histogram with no
/// positive pixel count is [`Classification::NoCoverage`].
pub fn summarize_histogram(histogram: &[(String, f64)]) -> Classification {
    // ---
    let total: f64 = histogram.iter().map(|(_, c)| c.max(0.0)).sum();
    if total <= 0.0 || !total.is_finite() {
        return Classification::NoCoverage;
    }

    let all: Vec<RegionPercentage> = histogram
        .iter()
        .map(|(key, count)| {
            let class = RegionClass::from_key(key);
            if let RegionClass::Unknown { key } = &class {
                debug!("Land-cover class {:?} has no eco-region name", key);
            }
            RegionPercentage {
                name: class.name().to_string(),
                percentage: 100.0 * count.max(0.0) / total,
            }
        })
        .collect();

    let mut dominant = &all[0];
    for region in &all[1..] {
        if region.percentage > dominant.percentage {
            dominant = region;
        }
    }

    Classification::Classified {
        dominant: dominant.clone(),
        all,
    }
}

/// Classify `polygon` against the land-cover raster.
pub async fn classify_region(
    source: &dyn LandCoverSource,
    polygon: &Polygon,
    settings: &RegionSettings,
) -> Classification {
    // ---
    let request = HistogramRequest {
        asset: settings.asset.clone(),
        band: settings.band.clone(),
        ring: polygon.closed_ring(),
        scale: settings.scale,
        max_pixels: settings.max_pixels,
    };

    match source.frequency_histogram(&request).await {
        Ok(Some(histogram)) => summarize_histogram(&histogram),
        Ok(None) => {
            debug!("Band {} absent over polygon", settings.band);
            Classification::NoCoverage
        }
        Err(e) => {
            warn!("Region classification failed: {}", e);
            Classification::Failed {
                cause: e.to_string(),
            }
        }
    }
}
