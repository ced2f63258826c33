//! Seed data for the in-memory backend.
#![allow(dead_code)]

use photo_analysis_jobs::db::memory::MemoryStore;
use uuid::Uuid;

/// A project owned by `owner` and the images seeded into it.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    pub owner: Uuid,
    pub project_id: Uuid,
    pub image_ids: Vec<Uuid>,
}

/// Project with `images` images, none of which has a thumbnail yet.
pub async fn seed_project(store: &MemoryStore, images: usize) -> ProjectFixture {
    let owner = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    store.insert_project(project_id, owner).await;

    let mut image_ids = Vec::with_capacity(images);
    for _ in 0..images {
        let id = Uuid::new_v4();
        store.insert_image(id, project_id, Some(owner), None).await;
        image_ids.push(id);
    }

    ProjectFixture {
        owner,
        project_id,
        image_ids,
    }
}

/// Project where only the first `missing` of `images` images lack a
/// thumbnail.
pub async fn seed_project_with_thumbnails(
    store: &MemoryStore,
    images: usize,
    missing: usize,
) -> ProjectFixture {
    let owner = Uuid::new_v4();
    let project_id = Uuid::new_v4();
    store.insert_project(project_id, owner).await;

    let mut image_ids = Vec::with_capacity(images);
    for i in 0..images {
        let id = Uuid::new_v4();
        let thumbnail = (i >= missing).then(|| format!("thumbnails/{id}.jpg"));
        store.insert_image(id, project_id, Some(owner), thumbnail).await;
        image_ids.push(id);
    }

    ProjectFixture {
        owner,
        project_id,
        image_ids,
    }
}

/// An image in someone else's project.
pub async fn seed_foreign_image(store: &MemoryStore) -> Uuid {
    let project_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    store.insert_project(project_id, owner).await;
    let id = Uuid::new_v4();
    store.insert_image(id, project_id, Some(owner), None).await;
    id
}
