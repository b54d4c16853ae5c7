//! Price-area registry
//!
//! The five Norwegian electricity price areas and the reference location whose
//! weather is paired with each area's energy series. This is the single source
//! of truth for area codes and weather entity ids.

/// Metadata for one price area.
#[derive(Debug)]
pub struct PriceArea {
    /// Area code as used by the grid operator, e.g. "NO1"
    pub code: &'static str,
    /// City used as the weather reference location
    pub city: &'static str,
    /// WGS84 latitude of the reference location
    pub latitude: f64,
    /// WGS84 longitude of the reference location
    pub longitude: f64,
}

impl PriceArea {
    /// Entity id under which the area's weather series are stored
    pub fn weather_entity(&self) -> String {
        format!("{}-weather", self.code)
    }
}

pub static PRICE_AREA_REGISTRY: &[PriceArea] = &[
    PriceArea {
        code: "NO1",
        city: "Oslo",
        latitude: 59.9139,
        longitude: 10.7522,
    },
    PriceArea {
        code: "NO2",
        city: "Kristiansand",
        latitude: 58.1467,
        longitude: 7.9956,
    },
    PriceArea {
        code: "NO3",
        city: "Trondheim",
        latitude: 63.4305,
        longitude: 10.3951,
    },
    PriceArea {
        code: "NO4",
        city: "Tromsø",
        latitude: 69.6492,
        longitude: 18.9553,
    },
    PriceArea {
        code: "NO5",
        city: "Bergen",
        latitude: 60.39299,
        longitude: 5.32415,
    },
];

pub fn find_price_area(code: &str) -> Option<&'static PriceArea> {
    PRICE_AREA_REGISTRY.iter().find(|a| a.code == code)
}

pub fn all_area_codes() -> Vec<&'static str> {
    PRICE_AREA_REGISTRY.iter().map(|a| a.code).collect()
}

/// Weather entity paired with a price area's energy series.
pub fn weather_entity_for(price_area: &str) -> Option<String> {
    find_price_area(price_area).map(PriceArea::weather_entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_five_areas() {
        assert_eq!(all_area_codes(), vec!["NO1", "NO2", "NO3", "NO4", "NO5"]);
    }

    #[test]
    fn test_coordinates_are_in_norway() {
        for area in PRICE_AREA_REGISTRY {
            assert!(
                (57.0..72.0).contains(&area.latitude),
                "{} latitude {} outside Norway",
                area.code,
                area.latitude
            );
            assert!((4.0..32.0).contains(&area.longitude));
        }
    }

    #[test]
    fn test_weather_entity_pairing() {
        assert_eq!(weather_entity_for("NO5").as_deref(), Some("NO5-weather"));
        assert_eq!(find_price_area("NO4").map(|a| a.city), Some("Tromsø"));
        assert!(weather_entity_for("SE3").is_none());
    }
}
