//! Configuration shared by the CLI and the server.

use oar_forms::core::config::FormConfig;
use oar_forms::core::errors::FormResult;
use oar_forms::pipeline::{BatchRunner, CredentialImpersonator, PipelineFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded configuration file together with its location.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Absolute path of the file, handed on to worker processes.
    pub path: PathBuf,
    pub form: FormConfig,
}

impl AppConfig {
    /// Reads the file and checks that every configured model exists.
    pub fn load(path: &Path) -> FormResult<Self> {
        let path = std::path::absolute(path)?;
        let form = FormConfig::from_file(&path)?;
        form.validate_paths()?;
        Ok(Self { path, form })
    }

    /// A batch runner for `factory` following the `[batch]` section.
    ///
    /// With `impersonate`, every image is bracketed by the account from
    /// `impersonation.connection_string`.
    pub fn batch_runner(
        &self,
        factory: PipelineFactory,
        impersonate: bool,
    ) -> FormResult<BatchRunner> {
        let runner =
            BatchRunner::from_config(factory, &self.form.batch).with_worker_config(&self.path);
        if !impersonate {
            return Ok(runner);
        }
        let impersonator = CredentialImpersonator::from_connection_string(
            self.form.impersonation.connection_string.as_deref(),
        )?;
        Ok(runner.with_impersonator(Arc::new(impersonator)))
    }
}
