//! Wire types for the Business Profile APIs and their mapping onto db rows.

use chrono::{DateTime, Utc};
use db::models::{
    account::UpsertGoogleAccount,
    location::UpsertLocation,
    media_item::{MediaFormat, UpsertMediaItem},
    post::{PostTopicType, UpsertPost},
    review::UpsertReview,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of a list call.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAccount {
    /// `accounts/{id}`
    pub name: String,
    pub account_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
}

impl From<&GoogleAccount> for UpsertGoogleAccount {
    fn from(account: &GoogleAccount) -> Self {
        Self {
            google_name: account.name.clone(),
            account_name: account
                .account_name
                .clone()
                .unwrap_or_else(|| account.name.clone()),
            account_type: account.account_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumbers {
    pub primary_phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub region_code: Option<String>,
    pub postal_code: Option<String>,
    pub administrative_area: Option<String>,
    pub locality: Option<String>,
    #[serde(default)]
    pub address_lines: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Categories {
    pub primary_category: Option<Category>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocationMetadata {
    pub maps_uri: Option<String>,
    pub place_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLocation {
    /// `locations/{id}`
    pub name: String,
    pub title: Option<String>,
    pub phone_numbers: Option<PhoneNumbers>,
    pub storefront_address: Option<PostalAddress>,
    pub website_uri: Option<String>,
    pub categories: Option<Categories>,
    pub latlng: Option<LatLng>,
    pub metadata: Option<LocationMetadata>,
    /// Untouched payload, filled in by the client.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl GoogleLocation {
    pub fn to_upsert(&self) -> UpsertLocation {
        let address = self.storefront_address.clone().unwrap_or_default();
        let address_line = Some(address.address_lines.join(", ")).filter(|s| !s.is_empty());
        let metadata = self.metadata.clone().unwrap_or_default();

        UpsertLocation {
            google_name: self.name.clone(),
            title: self.title.clone().unwrap_or_else(|| self.name.clone()),
            address: address_line,
            locality: address.locality,
            region: address.administrative_area,
            postal_code: address.postal_code,
            country_code: address.region_code,
            phone: self
                .phone_numbers
                .as_ref()
                .and_then(|p| p.primary_phone.clone()),
            website_uri: self.website_uri.clone(),
            primary_category: self
                .categories
                .as_ref()
                .and_then(|c| c.primary_category.as_ref())
                .and_then(|c| c.display_name.clone()),
            latitude: self.latlng.map(|l| l.latitude),
            longitude: self.latlng.map(|l| l.longitude),
            maps_uri: metadata.maps_uri,
            place_id: metadata.place_id,
            raw: (!self.raw.is_null()).then(|| self.raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    pub display_name: Option<String>,
    pub profile_photo_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReply {
    pub comment: String,
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleReview {
    /// `accounts/{a}/locations/{l}/reviews/{r}`
    pub name: String,
    pub review_id: String,
    pub reviewer: Option<Reviewer>,
    /// `ONE` .. `FIVE`, or `STAR_RATING_UNSPECIFIED`
    pub star_rating: Option<String>,
    pub comment: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub review_reply: Option<ReviewReply>,
}

impl GoogleReview {
    pub fn stars(&self) -> Option<i64> {
        match self.star_rating.as_deref()? {
            "ONE" => Some(1),
            "TWO" => Some(2),
            "THREE" => Some(3),
            "FOUR" => Some(4),
            "FIVE" => Some(5),
            _ => None,
        }
    }

    /// `None` for reviews without a usable star rating.
    pub fn to_upsert(&self, location_id: Uuid) -> Option<UpsertReview> {
        Some(UpsertReview {
            location_id,
            google_review_id: self.review_id.clone(),
            google_name: self.name.clone(),
            reviewer_name: self.reviewer.as_ref().and_then(|r| r.display_name.clone()),
            reviewer_photo_url: self
                .reviewer
                .as_ref()
                .and_then(|r| r.profile_photo_url.clone()),
            star_rating: self.stars()?,
            comment: self.comment.clone(),
            reply_comment: self.review_reply.as_ref().map(|r| r.comment.clone()),
            reply_updated_at: self.review_reply.as_ref().and_then(|r| r.update_time),
            review_created_at: self.create_time,
            review_updated_at: self.update_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAssociation {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleMediaItem {
    pub name: String,
    pub media_format: Option<String>,
    pub location_association: Option<LocationAssociation>,
    pub google_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
}

impl GoogleMediaItem {
    pub fn to_upsert(&self, location_id: Uuid) -> UpsertMediaItem {
        UpsertMediaItem {
            location_id,
            google_name: self.name.clone(),
            media_format: self
                .media_format
                .as_deref()
                .and_then(|f| f.parse::<MediaFormat>().ok())
                .unwrap_or_default(),
            category: self
                .location_association
                .as_ref()
                .and_then(|a| a.category.clone()),
            google_url: self.google_url.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToAction {
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMedia {
    pub media_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub google_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLocalPost {
    pub name: String,
    pub summary: Option<String>,
    pub topic_type: Option<String>,
    pub call_to_action: Option<CallToAction>,
    #[serde(default)]
    pub media: Vec<PostMedia>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl GoogleLocalPost {
    pub fn to_upsert(&self, location_id: Uuid) -> UpsertPost {
        UpsertPost {
            location_id,
            google_name: self.name.clone(),
            topic_type: self
                .topic_type
                .as_deref()
                .and_then(|t| t.parse::<PostTopicType>().ok())
                .unwrap_or_default(),
            summary: self.summary.clone().unwrap_or_default(),
            call_to_action_type: self.call_to_action.as_ref().map(|c| c.action_type.clone()),
            call_to_action_url: self.call_to_action.as_ref().and_then(|c| c.url.clone()),
            media_url: self
                .media
                .first()
                .and_then(|m| m.google_url.clone().or_else(|| m.source_url.clone())),
            published_at: self.create_time,
        }
    }
}

/// Body of a `localPosts.create` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocalPost {
    pub language_code: String,
    pub summary: String,
    pub topic_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<CallToAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<PostMedia>,
}

impl NewLocalPost {
    pub fn from_post(post: &db::models::post::Post) -> Self {
        Self {
            language_code: "en".to_string(),
            summary: post.summary.clone(),
            topic_type: post.topic_type.as_google().to_string(),
            call_to_action: post
                .call_to_action_type
                .as_ref()
                .map(|action_type| CallToAction {
                    action_type: action_type.clone(),
                    url: post.call_to_action_url.clone(),
                }),
            media: post
                .media_url
                .iter()
                .map(|url| PostMedia {
                    media_format: "PHOTO".to_string(),
                    source_url: Some(url.clone()),
                    google_url: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListAccountsResponse {
    #[serde(default)]
    pub accounts: Vec<GoogleAccount>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListLocationsResponse {
    #[serde(default)]
    pub locations: Vec<serde_json::Value>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListReviewsResponse {
    #[serde(default)]
    pub reviews: Vec<GoogleReview>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListMediaResponse {
    #[serde(default)]
    pub media_items: Vec<GoogleMediaItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListLocalPostsResponse {
    #[serde(default)]
    pub local_posts: Vec<GoogleLocalPost>,
    pub next_page_token: Option<String>,
}
