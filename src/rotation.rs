//! Rotation Engine (spec §4.F): SDCard / URL / AI mode dispatch.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::display::DisplayGate;
use crate::error::CoreError;
use crate::pipeline::{ImagePipeline, PipelineDestination, PipelineInput, PipelineOutput};
use crate::store::albums::AlbumStore;
use crate::store::rotation_config::{RotationConfigStore, RotationMode, SdCardMode};
use crate::store::NvsStore;

const MAX_RANDOM_RETRIES: u32 = 10;
const DOWNLOADS_ALBUM: &str = "Downloads";

/// AI image-generation phase (spec §4.F: "Idle → Generating → Downloading
/// → Complete or Error").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Idle,
    Generating,
    Downloading,
    Complete,
    Error,
}

/// OpenAI-images-compatible provider, parameterized by endpoint and key
/// so a different provider can be substituted without touching the state
/// machine (SPEC_FULL.md supplementary note on `AiProvider`).
pub struct AiProvider {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

#[derive(serde::Serialize)]
struct AiRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    output_format: &'a str,
    output_compression: u8,
}

#[derive(serde::Deserialize)]
struct AiResponseEnvelope {
    data: Vec<AiResponseItem>,
}

#[derive(serde::Deserialize)]
struct AiResponseItem {
    url: Option<String>,
    b64_json: Option<String>,
}

pub struct RotationEngine {
    nvs: Arc<NvsStore>,
    rotation_config: Arc<RotationConfigStore>,
    albums: Arc<AlbumStore>,
    pipeline: Arc<ImagePipeline>,
    display: Arc<DisplayGate>,
    image_root: PathBuf,
    http: reqwest::Client,
    display_width: u32,
    display_height: u32,
    ai_in_flight: AtomicBool,
    ai_state: tokio::sync::RwLock<AiState>,
}

impl RotationEngine {
    pub fn new(
        nvs: Arc<NvsStore>,
        rotation_config: Arc<RotationConfigStore>,
        albums: Arc<AlbumStore>,
        pipeline: Arc<ImagePipeline>,
        display: Arc<DisplayGate>,
        image_root: PathBuf,
        display_width: u32,
        display_height: u32,
    ) -> Self {
        Self {
            nvs,
            rotation_config,
            albums,
            pipeline,
            display,
            image_root,
            http: reqwest::Client::new(),
            display_width,
            display_height,
            ai_in_flight: AtomicBool::new(false),
            ai_state: tokio::sync::RwLock::new(AiState::Idle),
        }
    }

    /// Current AI generation phase (spec §4.F).
    pub async fn ai_state(&self) -> AiState {
        *self.ai_state.read().await
    }

    async fn set_ai_state(&self, state: AiState) {
        *self.ai_state.write().await = state;
    }

    /// Single public operation, dispatched by the persisted rotation mode
    /// (spec §4.F).
    pub async fn rotate(&self) -> Result<(), CoreError> {
        let config = self.rotation_config.load().await;
        match config.mode {
            RotationMode::SdCard => self.rotate_sd_card(config.sd_card_mode).await,
            RotationMode::Url => self.rotate_url().await,
            RotationMode::Ai => self.rotate_ai().await,
        }
    }

    async fn rotate_sd_card(&self, mode: SdCardMode) -> Result<(), CoreError> {
        let pool = self.collect_pool().await?;
        if pool.is_empty() {
            return Err(CoreError::NotFound("no images in any enabled album".to_string()));
        }

        let config = self.rotation_config.load().await;
        let (chosen, pending_index) = match mode {
            SdCardMode::Random => (self.choose_random(&pool, config.last_displayed_path.as_deref()), None),
            SdCardMode::Sequential => {
                let index = next_sequential_index(config.last_index, pool.len());
                (pool[index].clone(), Some(index as i32))
            }
        };

        // Only advance persisted state once `show` has actually succeeded
        // (spec §7: "Rotation failures do not advance last-displayed or
        // last-index"; §3: the rotation engine is the sole mutator of
        // both fields).
        self.display.show(&chosen, &crate::store::palette::THEORETICAL_PALETTE).await?;
        if let Some(index) = pending_index {
            self.rotation_config.set_last_index(index).await.ok();
        }
        self.rotation_config
            .set_last_displayed_path(&chosen.to_string_lossy())
            .await
            .ok();
        Ok(())
    }

    /// Collect the recursive `.bmp`/`.png` pool across enabled albums,
    /// lazily pruning any enabled name whose directory no longer exists
    /// (spec §4.F, §8 scenario S5).
    async fn collect_pool(&self) -> Result<Vec<PathBuf>, CoreError> {
        let enabled = self.albums.enabled().await;
        let mut pool = Vec::new();

        for name in enabled {
            if !self.albums.exists(&name) {
                tracing::warn!(album = %name, "enabled album no longer exists, disabling");
                self.albums.set_enabled(&name, false).await.ok();
                continue;
            }
            pool.extend(self.albums.list_images(&name)?);
        }
        Ok(pool)
    }

    fn choose_random(&self, pool: &[PathBuf], last: Option<&str>) -> PathBuf {
        let mut rng = rand::thread_rng();
        let mut chosen = pool[rng.gen_range(0..pool.len())].clone();
        if pool.len() > 1 {
            let mut attempts = 0;
            while Some(chosen.to_string_lossy().as_ref()) == last && attempts < MAX_RANDOM_RETRIES {
                chosen = pool[rng.gen_range(0..pool.len())].clone();
                attempts += 1;
            }
        }
        chosen
    }

    async fn rotate_url(&self) -> Result<(), CoreError> {
        let config = self.rotation_config.load().await;
        if config.image_url.is_empty() {
            return Err(CoreError::InvalidState("no image URL configured".to_string()));
        }

        let mut request = self.http.get(&config.image_url);
        if let Some(token) = &config.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(header) = &config.extra_header {
            request = request.header(&header.key, &header.value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::InvalidState(format!("image fetch failed: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::InvalidState(format!("image fetch body read failed: {e}")))?;

        if config.save_downloaded {
            self.save_downloaded(&bytes).await.ok();
        }

        let out = self
            .pipeline
            .process(
                PipelineInput::Bytes { data: bytes.to_vec(), declared_format: None },
                PipelineDestination::Rgb,
            )
            .await?;

        match out {
            PipelineOutput::Rgb(buf) => {
                self.display
                    .show_rgb(&buf, self.display_width, self.display_height, &crate::store::palette::THEORETICAL_PALETTE)
                    .await
            }
            PipelineOutput::File(_) => unreachable!("Rgb destination never yields File"),
        }
    }

    async fn save_downloaded(&self, bytes: &[u8]) -> Result<(), CoreError> {
        let downloads = self.image_root.join(DOWNLOADS_ALBUM);
        tokio::fs::create_dir_all(&downloads).await?;
        let name = format!("download-{}.bin", unix_now());
        tokio::fs::write(downloads.join(name), bytes).await?;
        Ok(())
    }

    async fn rotate_ai(&self) -> Result<(), CoreError> {
        if self
            .ai_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::Busy);
        }
        let result = self.run_ai_generation().await;
        self.set_ai_state(if result.is_ok() { AiState::Complete } else { AiState::Error }).await;
        self.ai_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_ai_generation(&self) -> Result<(), CoreError> {
        let doc = self.nvs.snapshot().await;
        let config = doc.rotation;
        let ai = doc.ai;
        if ai.openai_key.is_empty() {
            return Err(CoreError::InvalidState("no AI provider key configured".to_string()));
        }

        let provider = AiProvider {
            endpoint: "https://api.openai.com/v1/images/generations".to_string(),
            api_key: ai.openai_key,
            model: ai.model,
        };

        let size = if self.display_height > self.display_width { "1024x1536" } else { "1536x1024" };
        let body = AiRequestBody {
            model: &provider.model,
            prompt: &config.ai_prompt,
            n: 1,
            size,
            quality: "high",
            output_format: "jpeg",
            output_compression: 90,
        };

        self.set_ai_state(AiState::Generating).await;
        let response = self
            .http
            .post(&provider.endpoint)
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::InvalidState(format!("AI request failed: {e}")))?;

        let envelope: AiResponseEnvelope = response
            .json()
            .await
            .map_err(|e| CoreError::InvalidState(format!("AI response parse failed: {e}")))?;

        let item = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::InvalidState("AI response had no image data".to_string()))?;

        self.set_ai_state(AiState::Downloading).await;
        let jpeg_bytes = if let Some(b64) = item.b64_json {
            base64_decode(&b64).map_err(|e| CoreError::DecodeError(format!("bad base64 in AI response: {e}")))?
        } else if let Some(url) = item.url {
            self.http
                .get(&url)
                .send()
                .await
                .map_err(|e| CoreError::InvalidState(format!("AI image download failed: {e}")))?
                .bytes()
                .await
                .map_err(|e| CoreError::InvalidState(format!("AI image download body read failed: {e}")))?
                .to_vec()
        } else {
            return Err(CoreError::InvalidState("AI response had neither url nor b64_json".to_string()));
        };

        let out = self
            .pipeline
            .process(
                PipelineInput::Bytes { data: jpeg_bytes, declared_format: Some(crate::pipeline::ImageFormat::Jpeg) },
                PipelineDestination::Rgb,
            )
            .await?;

        match out {
            PipelineOutput::Rgb(buf) => {
                self.display
                    .show_rgb(&buf, self.display_width, self.display_height, &crate::store::palette::THEORETICAL_PALETTE)
                    .await
            }
            PipelineOutput::File(_) => unreachable!("Rgb destination never yields File"),
        }
    }
}

fn next_sequential_index(last_index: i32, pool_size: usize) -> usize {
    let next = last_index + 1;
    (next.rem_euclid(pool_size as i32)) as usize
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_index_wraps_around_pool() {
        assert_eq!(next_sequential_index(-1, 5), 0);
        assert_eq!(next_sequential_index(4, 5), 0);
        assert_eq!(next_sequential_index(2, 5), 3);
    }

    #[test]
    fn sequential_index_handles_shrinking_pool() {
        // last_index points past the end of a pool that shrank since.
        assert_eq!(next_sequential_index(9, 3), 1);
    }

    #[test]
    fn base64_decode_round_trips_known_vector() {
        // "hello" -> "aGVsbG8="
        let decoded = base64_decode("aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }
}
