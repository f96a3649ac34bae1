use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::dto::PublicUser;

/// One image in the caller's own listing.
#[derive(Debug, Serialize)]
pub struct ImageListItem {
    pub id: i64,
    pub file_name: String,
    pub upload_date: OffsetDateTime,
}

impl From<crate::images::repo::Image> for ImageListItem {
    fn from(i: crate::images::repo::Image) -> Self {
        Self {
            id: i.id,
            file_name: i.file_name,
            upload_date: i.upload_date,
        }
    }
}

/// Request body for image rename.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

/// Upload constraints, returned where the upload form would render.
#[derive(Debug, Serialize)]
pub struct UploadInfo {
    pub field: &'static str,
    pub allowed_extensions: &'static [&'static str],
}

/// Full image record for the data overview.
#[derive(Debug, Serialize)]
pub struct OverviewImage {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub upload_date: OffsetDateTime,
    pub user_id: i64,
    pub active: bool,
}

impl From<crate::images::repo::Image> for OverviewImage {
    fn from(i: crate::images::repo::Image) -> Self {
        Self {
            id: i.id,
            file_name: i.file_name,
            file_path: i.file_path,
            upload_date: i.upload_date,
            user_id: i.user_id,
            active: i.active,
        }
    }
}

/// Everything the data overview shows: all users and all images.
#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub users: Vec<PublicUser>,
    pub images: Vec<OverviewImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_item_omits_the_disk_path() {
        let image = crate::images::repo::Image {
            id: 1,
            file_name: "t_photo.jpg".into(),
            file_path: "/srv/uploads/1/t_photo.jpg".into(),
            upload_date: OffsetDateTime::UNIX_EPOCH,
            user_id: 1,
            active: true,
        };
        let json = serde_json::to_string(&ImageListItem::from(image)).unwrap();
        assert!(json.contains("t_photo.jpg"));
        assert!(!json.contains("/srv/uploads"));
    }
}
