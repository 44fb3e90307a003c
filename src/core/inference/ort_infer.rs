//! ONNX Runtime session pool shared by the detection and entity models.

use crate::core::config::OrtSessionConfig;
use crate::core::errors::{FormError, FormResult, SimpleError};
use ndarray::{ArrayD, ArrayView2, ArrayView4, IxDyn};
use ort::session::{Session, SessionInputValue};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[path = "ort_infer_config.rs"]
mod ort_infer_config;

/// A pool of ONNX Runtime sessions for one model.
///
/// Calls are distributed round-robin over the pool; each session sits behind its own
/// mutex because running a session needs exclusive access.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Loads a model with the given session settings.
    pub fn from_config(cfg: &OrtSessionConfig, model_path: impl AsRef<Path>) -> FormResult<Self> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(FormError::model_load_error(
                path,
                "file not found",
                Some("check the model paths in the configuration file"),
                None::<std::io::Error>,
            ));
        }

        let pool_size = cfg.get_session_pool_size();
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let builder = Self::apply_ort_config(Session::builder()?, cfg)?;
            let session = builder.commit_from_file(path).map_err(|e| {
                FormError::model_load_error(
                    path,
                    "failed to create ONNX session",
                    Some("verify model path and compatibility with selected execution providers"),
                    Some(e),
                )
            })?;
            sessions.push(Mutex::new(session));
        }

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();
        tracing::info!(model = %model_name, sessions = pool_size, "model loaded");

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Names of the model inputs, in declaration order.
    pub fn input_names(&self) -> FormResult<Vec<String>> {
        let session = self.sessions[0].lock().map_err(|_| self.lock_error())?;
        Ok(session.inputs.iter().map(|i| i.name.clone()).collect())
    }

    /// Runs a single 4D `f32` input and extracts the named `f32` outputs.
    ///
    /// Outputs are returned in the order of `output_names`.
    pub fn run_image(
        &self,
        input_name: &str,
        x: ArrayView4<'_, f32>,
        output_names: &[&str],
    ) -> FormResult<Vec<ArrayD<f32>>> {
        let tensor = TensorRef::from_array_view(x).map_err(|e| {
            FormError::inference_error(
                &self.model_name,
                format!("failed to convert input tensor '{input_name}'"),
                e,
            )
        })?;
        let inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            vec![(Cow::Borrowed(input_name), tensor.into())];
        self.run(inputs, output_names)
    }

    /// Runs 2D `i64` inputs (token ids, masks) and extracts the named `f32` outputs.
    pub fn run_tokens(
        &self,
        inputs: &[(&str, ArrayView2<'_, i64>)],
        output_names: &[&str],
    ) -> FormResult<Vec<ArrayD<f32>>> {
        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(inputs.len());
        for (name, view) in inputs {
            let tensor = TensorRef::from_array_view(view.view()).map_err(|e| {
                FormError::inference_error(
                    &self.model_name,
                    format!("failed to convert input tensor '{name}'"),
                    e,
                )
            })?;
            values.push((Cow::Borrowed(*name), tensor.into()));
        }
        self.run(values, output_names)
    }

    fn run(
        &self,
        inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)>,
        output_names: &[&str],
    ) -> FormResult<Vec<ArrayD<f32>>> {
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock().map_err(|_| self.lock_error())?;

        let outputs = session.run(inputs).map_err(|e| {
            FormError::inference_error(&self.model_name, "forward pass failed", e)
        })?;

        let mut extracted = Vec::with_capacity(output_names.len());
        for name in output_names {
            let value = outputs.get(*name).ok_or_else(|| {
                FormError::inference_error(
                    &self.model_name,
                    format!("model has no output named '{name}'"),
                    SimpleError::new("missing output"),
                )
            })?;
            let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
                FormError::inference_error(
                    &self.model_name,
                    format!("failed to extract output tensor '{name}' as f32"),
                    e,
                )
            })?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            extracted.push(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        Ok(extracted)
    }

    fn lock_error(&self) -> FormError {
        FormError::inference_error(
            &self.model_name,
            "failed to acquire session lock",
            SimpleError::new("session lock poisoned"),
        )
    }
}
