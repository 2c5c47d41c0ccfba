use std::collections::HashMap;

use serde::Serialize;

use crate::search::PlaceRecord;

/// Background alpha for relevance-tinted table rows.
const ROW_ALPHA: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// One row handed to the table renderer. Everything is pre-formatted; the
/// frontend only paints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub rank: String,
    pub name: String,
    pub rating: String,
    pub reviews: String,
    pub address: String,
    pub place_id: Option<String>,
    pub plus_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub color: RowColor,
}

/// Position in the provider's original ranking mapped to [0, 1]; the front
/// of the list is 1.0. Single-element lists are fully relevant.
pub fn relevance(original_index: usize, original_len: usize) -> f64 {
    if original_len > 1 {
        1.0 - original_index as f64 / (original_len - 1) as f64
    } else {
        1.0
    }
}

/// Red (0.0) to green (1.0) gradient over the relevance score.
pub fn relevance_color(relevance: f64) -> RowColor {
    RowColor {
        r: (255.0 * (1.0 - relevance)) as u8,
        g: (255.0 * relevance) as u8,
        b: 0,
        a: ROW_ALPHA,
    }
}

/// Builds display rows for the ranked records, numbering and coloring each by
/// its index in the original arrival order. Records whose `id` is absent or
/// unmatched fall back to their ranked position.
pub fn table_rows(ranked: &[PlaceRecord], original_order: &[PlaceRecord]) -> Vec<ResultRow> {
    let id_to_index: HashMap<&str, usize> = original_order
        .iter()
        .enumerate()
        .filter_map(|(idx, place)| place.id.as_deref().map(|id| (id, idx)))
        .collect();
    let original_len = original_order.len();

    ranked
        .iter()
        .enumerate()
        .map(|(row, place)| {
            let original_index = place
                .id
                .as_deref()
                .and_then(|id| id_to_index.get(id).copied())
                .unwrap_or(row);
            let score = relevance(original_index, original_len);
            let coordinates = place.coordinates();

            ResultRow {
                rank: (original_index + 1).to_string(),
                name: place.name().to_string(),
                rating: place.rating.map(|r| r.to_string()).unwrap_or_default(),
                reviews: place.user_rating_count.to_string(),
                address: place.formatted_address.clone().unwrap_or_default(),
                place_id: place.id.clone(),
                plus_code: place.plus_code_value().map(str::to_string),
                latitude: coordinates.map(|(lat, _)| lat),
                longitude: coordinates.map(|(_, lon)| lon),
                color: relevance_color(score),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{LocalizedText, Location};

    fn place(id: Option<&str>, reviews: u64) -> PlaceRecord {
        PlaceRecord {
            id: id.map(str::to_string),
            display_name: Some(LocalizedText {
                text: Some(format!("Place {}", id.unwrap_or("?"))),
            }),
            formatted_address: Some("Somewhere 1".into()),
            rating: Some(4.5),
            user_rating_count: reviews,
            location: Some(Location {
                latitude: Some(48.86),
                longitude: Some(2.29),
            }),
            plus_code: None,
        }
    }

    #[test]
    fn relevance_spans_the_original_order() {
        assert_eq!(relevance(0, 5), 1.0);
        assert_eq!(relevance(4, 5), 0.0);
        assert_eq!(relevance(2, 5), 0.5);
        assert_eq!(relevance(0, 1), 1.0);
        assert_eq!(relevance(7, 1), 1.0);
    }

    #[test]
    fn color_interpolates_red_to_green() {
        assert_eq!(
            relevance_color(1.0),
            RowColor {
                r: 0,
                g: 255,
                b: 0,
                a: ROW_ALPHA
            }
        );
        assert_eq!(
            relevance_color(0.0),
            RowColor {
                r: 255,
                g: 0,
                b: 0,
                a: ROW_ALPHA
            }
        );
        let middle = relevance_color(0.5);
        assert_eq!((middle.r, middle.g, middle.b), (127, 127, 0));
    }

    #[test]
    fn ranks_come_from_the_original_order() {
        let original = vec![place(Some("a"), 10), place(Some("b"), 50), place(Some("c"), 30)];
        // Ranked puts the highest-reviewed first.
        let ranked = vec![original[1].clone(), original[2].clone(), original[0].clone()];

        let rows = table_rows(&ranked, &original);

        assert_eq!(rows[0].rank, "2");
        assert_eq!(rows[1].rank, "3");
        assert_eq!(rows[2].rank, "1");
        // First arrival is the most relevant, so it gets the greenest row.
        assert!(rows[2].color.g > rows[0].color.g);
        assert!(rows[1].color.g == 0 && rows[1].color.r == 255);
    }

    #[test]
    fn unmatched_id_falls_back_to_ranked_position() {
        let original = vec![place(Some("a"), 10), place(Some("b"), 20)];
        let ranked = vec![place(None, 20), place(Some("a"), 10)];

        let rows = table_rows(&ranked, &original);

        assert_eq!(rows[0].rank, "1");
        assert_eq!(rows[1].rank, "1");
    }

    #[test]
    fn rows_carry_display_fields() {
        let original = vec![place(Some("a"), 12)];
        let rows = table_rows(&original, &original);

        let row = &rows[0];
        assert_eq!(row.name, "Place a");
        assert_eq!(row.rating, "4.5");
        assert_eq!(row.reviews, "12");
        assert_eq!(row.address, "Somewhere 1");
        assert_eq!(row.place_id.as_deref(), Some("a"));
        assert_eq!(row.latitude, Some(48.86));
    }
}
