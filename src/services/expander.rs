use std::collections::HashSet;

use uuid::Uuid;

use crate::db::repository::{ImageRef, ProjectCatalog};
use crate::error::JobResult;
use crate::models::job::{ImageSelection, JobProfile, NewJobItem};

/// Resolve the images a profile targets within a project.
///
/// For upload-triggered jobs only the uploaded ids that actually belong to
/// the project are kept, in upload order and without duplicates.
pub async fn select_images(
    catalog: &dyn ProjectCatalog,
    project_id: Uuid,
    profile: JobProfile,
    uploaded: &[Uuid],
) -> JobResult<Vec<ImageRef>> {
    match profile.selection() {
        ImageSelection::AllImages => catalog.list_images(project_id).await,
        ImageSelection::MissingThumbnail => catalog.list_images_missing_thumbnail(project_id).await,
        ImageSelection::Uploaded => {
            let in_project = catalog.list_images(project_id).await?;
            let mut seen = HashSet::new();
            Ok(uploaded
                .iter()
                .filter(|id| seen.insert(**id))
                .filter_map(|id| in_project.iter().find(|img| img.id == *id).cloned())
                .collect())
        }
    }
}

/// One item per (image, task). Image-major order so a dispatch batch keeps an
/// image's tasks together.
pub fn expand(profile: JobProfile, images: &[ImageRef]) -> Vec<NewJobItem> {
    let tasks = profile.tasks();
    images
        .iter()
        .flat_map(|image| {
            tasks.iter().map(move |&task| NewJobItem {
                image_id: image.id,
                task,
            })
        })
        .collect()
}
