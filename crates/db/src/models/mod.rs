pub mod campaign;
pub mod generated_image;
pub mod status;
