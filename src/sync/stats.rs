use crate::protocol::Book;
use serde::Serialize;

/// Aggregate figures over a book list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryStats {
    pub total: usize,
    pub read: usize,
    pub unread: usize,
    pub favorites: usize,
    /// Books carrying a rating
    pub rated: usize,
    /// Mean over rated books only, 0 when none are rated
    pub average_rating: f64,
    /// `average_rating / 5`, clamped to `[0, 1]`
    pub average_normalized: f64,
}

impl LibraryStats {
    pub fn from_books(books: &[Book]) -> Self {
        let total = books.len();
        let read = books.iter().filter(|b| b.read).count();
        let favorites = books.iter().filter(|b| b.favorite).count();

        let ratings: Vec<f64> = books
            .iter()
            .filter_map(|b| b.rating)
            .map(f64::from)
            .collect();
        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().sum::<f64>() / ratings.len() as f64
        };

        Self {
            total,
            read,
            unread: total - read,
            favorites,
            rated: ratings.len(),
            average_rating,
            average_normalized: (average_rating / 5.0).clamp(0.0, 1.0),
        }
    }
}
