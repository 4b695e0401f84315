//! Error types for the application.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] strandfx_gpu::ConfigError),

    #[error("Hair file error: {0}")]
    Tfx(#[from] strandfx_data::TfxError),

    #[error("Hair preparation error: {0}")]
    Hair(#[from] strandfx_data::HairError),

    #[error("Scene error: {0}")]
    Scene(#[from] strandfx_gpu::SceneError),

    #[error("Renderer error: {0}")]
    Renderer(#[from] strandfx_gpu::RendererError),

    #[error("Backend error: {0}")]
    Backend(#[from] strandfx_gpu::BackendError),

    #[error("Resource error: {0}")]
    Resource(#[from] strandfx_gpu::ResourceError),
}
