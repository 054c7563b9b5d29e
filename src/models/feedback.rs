//! Feedback (ratings) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Feedback row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Feedback {
    pub id: i32,
    pub user_id: i32,
    pub ebook_id: i32,
    pub rating: i16,
    pub comment: Option<String>,
    pub date_created: DateTime<Utc>,
}

/// Rate book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RateBook {
    #[validate(range(min = 1, message = "EBook ID is required"))]
    pub ebook_id: i32,
    #[validate(range(min = 0, max = 5, message = "Rating must be between 0 and 5"))]
    pub rating: i16,
    pub comment: Option<String>,
}

/// Average rating given by one user to one book
#[derive(Debug, Clone, FromRow)]
pub struct FeedbackSummary {
    pub user_id: i32,
    pub ebook_id: i32,
    pub username: String,
    pub title: String,
    pub avg_rating: f64,
}

/// Arithmetic mean of the ratings, 0.0 when there are none
pub fn average_rating(ratings: &[i16]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    sum as f64 / ratings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[4]), 4.0);
        assert_eq!(average_rating(&[3, 5]), 4.0);
        assert!((average_rating(&[1, 2, 2]) - 5.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average_rating_is_order_independent() {
        let ratings = [5, 0, 3, 4, 1];
        let mut reversed = ratings;
        reversed.reverse();
        assert_eq!(average_rating(&ratings), average_rating(&reversed));
    }

    #[test]
    fn test_rating_range_validation() {
        let rate = |rating| RateBook {
            ebook_id: 1,
            rating,
            comment: None,
        };
        assert!(rate(0).validate().is_ok());
        assert!(rate(5).validate().is_ok());
        assert!(rate(6).validate().is_err());
        assert!(rate(-1).validate().is_err());
    }
}
