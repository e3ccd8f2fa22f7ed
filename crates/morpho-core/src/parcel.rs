use geo::{BoundingRect, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crs::Crs;

/// Derived shape descriptors of one parcel. Lengths in metres, areas in m².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParcelMetrics {
    pub area_m2: f64,
    /// log10(area + 1); the grain-size scale used for mapping and clustering.
    pub log_area: f64,
    pub perimeter_m: f64,
    /// Perimeter over area (1/m). Higher = less efficient outline.
    pub perimeter_area_ratio: f64,
    /// Polsby-Popper index 4πA/P², 1 for a circle.
    pub compactness_idx: f64,
    /// Area over minimum-rotated-rectangle area, 1 for a rectangle.
    pub rectangularity_idx: f64,
    /// Main-axis angle from North folded into [0°, 90°].
    /// 0 = N/S alignment, 90 = E/W alignment.
    pub orientation_deg: f64,
}

/// One land parcel.
#[derive(Debug, Clone)]
pub struct Parcel {
    /// Position in the input file; stable across stages.
    pub id: usize,
    /// `None` when the source feature had no polygonal geometry.
    pub geometry: Option<MultiPolygon<f64>>,
    /// Source attributes, passed through untouched.
    pub properties: Map<String, Value>,
    pub metrics: Option<ParcelMetrics>,
    pub cluster: Option<usize>,
}

impl Parcel {
    pub fn new(id: usize, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            geometry: Some(geometry),
            properties: Map::new(),
            metrics: None,
            cluster: None,
        }
    }

    /// Numeric attribute lookup. Accepts JSON numbers and numeric strings.
    pub fn numeric_property(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// An ordered parcel layer with its CRS.
#[derive(Debug, Clone)]
pub struct ParcelSet {
    pub crs: Crs,
    pub parcels: Vec<Parcel>,
}

impl ParcelSet {
    pub fn new(crs: Crs, parcels: Vec<Parcel>) -> Self {
        Self { crs, parcels }
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    /// Bounding rectangle over every geometry, or `None` for an empty layer.
    pub fn total_bounds(&self) -> Option<Rect<f64>> {
        self.parcels
            .iter()
            .filter_map(|p| p.geometry.as_ref()?.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }

    /// Iterator over parcels that carry metrics.
    pub fn measured(&self) -> impl Iterator<Item = (&Parcel, &ParcelMetrics)> {
        self.parcels.iter().filter_map(|p| p.metrics.as_ref().map(|m| (p, m)))
    }

    /// Sorted distinct cluster labels present in the layer.
    pub fn cluster_labels(&self) -> Vec<usize> {
        let mut labels: Vec<usize> = self.parcels.iter().filter_map(|p| p.cluster).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::rect;
    use super::*;
    use serde_json::json;

    #[test]
    fn total_bounds_covers_all_parcels() {
        let set = ParcelSet::new(
            Crs::Unknown,
            vec![Parcel::new(0, rect(0.0, 0.0, 10.0, 10.0)), Parcel::new(1, rect(20.0, -5.0, 5.0, 5.0))],
        );
        let b = set.total_bounds().unwrap();
        assert_eq!((b.min().x, b.min().y), (0.0, -5.0));
        assert_eq!((b.max().x, b.max().y), (25.0, 10.0));
    }

    #[test]
    fn total_bounds_of_empty_set_is_none() {
        assert!(ParcelSet::new(Crs::Unknown, vec![]).total_bounds().is_none());
    }

    #[test]
    fn numeric_property_accepts_numbers_and_numeric_strings() {
        let mut p = Parcel::new(0, rect(0.0, 0.0, 1.0, 1.0));
        p.properties.insert("a".into(), json!(12.5));
        p.properties.insert("b".into(), json!(" 7 "));
        p.properties.insert("c".into(), json!("n/a"));
        assert_eq!(p.numeric_property("a"), Some(12.5));
        assert_eq!(p.numeric_property("b"), Some(7.0));
        assert_eq!(p.numeric_property("c"), None);
        assert_eq!(p.numeric_property("missing"), None);
    }

    #[test]
    fn cluster_labels_are_sorted_and_unique() {
        let mut parcels: Vec<Parcel> = (0..5).map(|i| Parcel::new(i, rect(0.0, 0.0, 1.0, 1.0))).collect();
        for (p, l) in parcels.iter_mut().zip([2, 0, 2, 1, 0]) {
            p.cluster = Some(l);
        }
        let set = ParcelSet::new(Crs::Unknown, parcels);
        assert_eq!(set.cluster_labels(), vec![0, 1, 2]);
    }
}
