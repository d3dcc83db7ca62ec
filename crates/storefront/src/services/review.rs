//! Product reviews.

use tracing::instrument;

use cornershop_core::{ProductId, ReviewId, UserId};

use super::{Logged, ServiceError, product, written};
use crate::db::{Delete, Insert, Persistence, Select, Table, Update, decode_rows, encode_row};
use crate::models::{NewReview, RatingSummary, Review, ReviewPatch};

/// Longest accepted comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;

fn normalize_comment(comment: Option<String>) -> Result<Option<String>, ServiceError> {
    let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    if comment
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
    {
        return Err(ServiceError::InvalidInput(format!(
            "Reviews are limited to {MAX_COMMENT_CHARS} characters."
        )));
    }
    Ok(comment)
}

/// Reviews for a product, newest first.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_reviews(
    db: &dyn Persistence,
    product: ProductId,
) -> Result<Vec<Review>, ServiceError> {
    let select = Select::new(Table::Reviews)
        .eq("product_id", product)
        .order_by_desc("created_at")
        .order_by_desc("id");
    let rows = db.select(&select).await.logged("get_reviews")?;
    decode_rows(Table::Reviews, rows).logged("get_reviews")
}

/// Create a review.
///
/// The rating is already range-checked by [`cornershop_core::Rating`].
///
/// # Errors
///
/// Returns `ServiceError::InvalidInput` for an overlong comment,
/// `ServiceError::NotFound` if the product does not exist, and
/// `ServiceError::Repository` if a query fails.
#[instrument(skip(db, review), fields(product = %review.product_id, rating = %review.rating))]
pub async fn create_review(db: &dyn Persistence, review: NewReview) -> Result<Review, ServiceError> {
    let review = NewReview {
        comment: normalize_comment(review.comment).logged("create_review")?,
        ..review
    };

    if product::get_product(db, review.product_id).await?.is_none() {
        return Err(ServiceError::NotFound("product")).logged("create_review");
    }

    let row = encode_row(&review).logged("create_review")?;
    let rows = db
        .insert(&Insert::one(Table::Reviews, row))
        .await
        .logged("create_review")?;
    written(Table::Reviews, rows).logged("create_review")
}

/// Edit one of `user`'s reviews.
///
/// # Errors
///
/// Returns `ServiceError::InvalidInput` for an empty patch or an overlong
/// comment, `ServiceError::NotFound` if `user` has no such review, and
/// `ServiceError::Repository` if the update fails.
#[instrument(skip(db, patch))]
pub async fn update_review(
    db: &dyn Persistence,
    user: UserId,
    id: ReviewId,
    patch: ReviewPatch,
) -> Result<Review, ServiceError> {
    let patch = ReviewPatch {
        comment: normalize_comment(patch.comment).logged("update_review")?,
        ..patch
    };
    let row = encode_row(&patch).logged("update_review")?;
    if row.is_empty() {
        return Err(ServiceError::InvalidInput("Nothing to update.".to_string()))
            .logged("update_review");
    }

    let rows = db
        .update(&Update::new(Table::Reviews, row).eq("id", id).eq("user_id", user))
        .await
        .logged("update_review")?;
    if rows.is_empty() {
        return Err(ServiceError::NotFound("review")).logged("update_review");
    }
    written(Table::Reviews, rows).logged("update_review")
}

/// Delete one of `user`'s reviews. Deleting a missing review succeeds.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the delete fails.
#[instrument(skip(db))]
pub async fn delete_review(
    db: &dyn Persistence,
    user: UserId,
    id: ReviewId,
) -> Result<(), ServiceError> {
    db.delete(&Delete::new(Table::Reviews).eq("id", id).eq("user_id", user))
        .await
        .logged("delete_review")?;
    Ok(())
}

/// Average rating and count.
#[must_use]
pub fn rating_summary(reviews: &[Review]) -> RatingSummary {
    RatingSummary::from_reviews(reviews)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::testing::{ALICE, BOB, seeded_store};
    use cornershop_core::Rating;
    use rust_decimal::Decimal;

    fn new_review(user: UserId, rating: i32, comment: &str) -> NewReview {
        NewReview {
            product_id: ProductId::new(1),
            user_id: user,
            rating: Rating::new(rating).unwrap(),
            comment: Some(comment.to_string()),
            author_name: Some("Ada".to_string()),
        }
    }

    #[tokio::test]
    async fn test_reviews_newest_first_and_summary() {
        let store = seeded_store().await;
        create_review(&store, new_review(ALICE, 5, "Great")).await.unwrap();
        create_review(&store, new_review(BOB, 4, "  Good  ")).await.unwrap();

        let reviews = get_reviews(&store, ProductId::new(1)).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].comment.as_deref(), Some("Good"));

        let summary = rating_summary(&reviews);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average, Some(Decimal::new(45, 1)));
        assert_eq!(summary.display_average(), "4.5 / 5");
        assert_eq!(reviews[1].stars(), "★★★★★");
    }

    #[tokio::test]
    async fn test_blank_comment_becomes_none_and_long_is_rejected() {
        let store = seeded_store().await;
        let review = create_review(&store, new_review(ALICE, 3, "   ")).await.unwrap();
        assert_eq!(review.comment, None);

        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            create_review(&store, new_review(ALICE, 3, &long)).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_review_for_missing_product() {
        let store = seeded_store().await;
        let mut review = new_review(ALICE, 2, "meh");
        review.product_id = ProductId::new(404);
        assert!(matches!(
            create_review(&store, review).await,
            Err(ServiceError::NotFound("product"))
        ));
    }

    #[tokio::test]
    async fn test_only_author_can_edit_or_delete() {
        let store = seeded_store().await;
        let review = create_review(&store, new_review(ALICE, 2, "meh")).await.unwrap();

        let patch = ReviewPatch {
            rating: Some(Rating::new(4).unwrap()),
            comment: None,
        };
        assert!(matches!(
            update_review(&store, BOB, review.id, patch.clone()).await,
            Err(ServiceError::NotFound("review"))
        ));
        let updated = update_review(&store, ALICE, review.id, patch).await.unwrap();
        assert_eq!(updated.rating.get(), 4);
        assert_eq!(updated.comment.as_deref(), Some("meh"));

        delete_review(&store, BOB, review.id).await.unwrap();
        assert_eq!(get_reviews(&store, ProductId::new(1)).await.unwrap().len(), 1);
        delete_review(&store, ALICE, review.id).await.unwrap();
        assert!(get_reviews(&store, ProductId::new(1)).await.unwrap().is_empty());
        delete_review(&store, ALICE, review.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_patch_rejected() {
        let store = seeded_store().await;
        assert!(matches!(
            update_review(&store, ALICE, ReviewId::new(1), ReviewPatch::default()).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_summary_without_reviews() {
        let summary = rating_summary(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.display_average(), "No ratings yet");
    }
}
