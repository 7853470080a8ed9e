pub mod campaign_repo;
pub mod generated_image_repo;

pub use campaign_repo::CampaignRepo;
pub use generated_image_repo::GeneratedImageRepo;
