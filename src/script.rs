//! ScriptGenerator - turns a topic and storyline into a lecture script.

use serde_json::Value;

use crate::ai::{extract_json, AiClient, GenerationError};
use crate::cache::ResponseCache;
use crate::models::{Scene, Script, ScriptInput};
use crate::util::estimate_speech_duration;

/// System prompt for every script request.
pub const SCRIPT_SYSTEM_PROMPT: &str = "당신은 교육 콘텐츠 전문 작가입니다.
주어진 주제와 스토리라인을 바탕으로 일인칭 시점의 강의 대본을 작성합니다.

대본 작성 원칙:
1. 청중에게 직접 말하는 듯한 친근한 어조 사용
2. 복잡한 개념은 쉬운 예시로 설명
3. 각 섹션은 하나의 슬라이드에 대응
4. 섹션별로 명확한 핵심 포인트 3-5개 도출
5. 자연스러운 전환 문구 사용
6. 시작과 끝에 인사말 포함";

const SECTION_SCHEMA: &str = r#"{
    "title": "프레젠테이션 제목",
    "description": "영상 설명 (2-3문장)",
    "sections": [
        {
            "section_id": 1,
            "title": "섹션 제목 (슬라이드 제목으로 사용)",
            "content": "이 섹션의 전체 대본 내용. 청중에게 말하듯이 자연스럽게 작성.",
            "key_points": ["핵심 포인트 1", "핵심 포인트 2", "핵심 포인트 3"],
            "slide_notes": "슬라이드에 추가할 시각적 요소 제안"
        }
    ],
    "tags": ["태그1", "태그2", "태그3"]
}"#;

/// Generates [`Script`]s through an LLM.
pub struct ScriptGenerator {
    client: AiClient,
    cache: Option<ResponseCache>,
}

impl ScriptGenerator {
    pub fn new(client: AiClient) -> Self {
        Self {
            client,
            cache: None,
        }
    }

    /// Reuse stored responses for identical requests.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the user prompt for `input`.
    pub fn build_prompt(input: &ScriptInput) -> String {
        let segments = input.storyline_segments();

        let mut prompt = String::from("다음 정보를 바탕으로 강의 대본을 작성해주세요.\n\n");
        prompt.push_str(&format!("주제: {}\n", input.topic));
        prompt.push_str(&format!("스토리라인: {}\n", input.storyline));
        prompt.push_str(&format!("목표 시간: {}분\n", input.duration_minutes));
        prompt.push_str(&format!("말투/톤: {}\n\n", input.tone));
        prompt.push_str("다음 JSON 형식으로 응답해주세요:\n");
        prompt.push_str(SECTION_SCHEMA);
        prompt.push_str("\n\n주의사항:\n");

        if segments.len() > 1 {
            prompt.push_str(&format!(
                "- 스토리라인의 {}개 단계마다 정확히 하나의 섹션을 순서대로 작성 (총 {}개 섹션)\n",
                segments.len(),
                segments.len()
            ));
            for (i, segment) in segments.iter().enumerate() {
                prompt.push_str(&format!("  {}. {}\n", i + 1, segment));
            }
            prompt.push_str("- 첫 섹션은 인사로 시작하고 마지막 섹션은 마무리 인사로 끝낼 것\n");
        } else {
            prompt.push_str("- 섹션 수는 목표 시간에 맞게 조절 (보통 1분당 1-2개 섹션)\n");
            prompt.push_str("- 인트로와 아웃트로 섹션 필수 포함\n");
        }
        prompt.push_str("- 각 섹션의 content는 해당 슬라이드를 보여주면서 읽을 대본\n");

        if input.language == "ko" {
            prompt.push_str("- 한국어로 작성");
        } else {
            prompt.push_str(&format!("- Write the script in language '{}'", input.language));
        }
        prompt
    }

    /// Generate a complete script.
    pub async fn generate(&self, input: &ScriptInput) -> Result<Script, GenerationError> {
        let prompt = Self::build_prompt(input);
        let key = ResponseCache::key(
            self.client.kind().as_str(),
            self.client.model(),
            SCRIPT_SYSTEM_PROMPT,
            &prompt,
        );

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            match extract_json(&cached).and_then(|v| parse_script(&v, input)) {
                Ok(script) => {
                    log::info!("Using cached script response ({})", key);
                    return Ok(script);
                }
                Err(e) => log::warn!("Ignoring unusable cached response {}: {}", key, e),
            }
        }

        log::info!(
            "Generating script with {} ({})",
            self.client.kind(),
            self.client.model()
        );
        let raw = self
            .client
            .generate_json_text(&prompt, Some(SCRIPT_SYSTEM_PROMPT))
            .await?;
        let script = parse_script(&extract_json(&raw)?, input)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&key, &raw) {
                log::warn!("Failed to cache script response: {}", e);
            }
        }

        log::info!(
            "Script '{}' has {} sections (~{:.0}s)",
            script.title,
            script.scenes.len(),
            script.total_duration_sec
        );
        Ok(script)
    }

    /// Rewrite one scene following `instruction`. The scene id is kept.
    pub async fn enhance_scene(
        &self,
        scene: &Scene,
        instruction: &str,
    ) -> Result<Scene, GenerationError> {
        let prompt = format!(
            "다음 대본 섹션을 개선해주세요.\n\n현재 내용:\n제목: {}\n대본: {}\n\n개선 지시: {}\n\n\
             같은 JSON 형식으로 개선된 섹션을 반환해주세요:\n\
             {{\n    \"section_id\": {},\n    \"title\": \"개선된 제목\",\n    \"content\": \"개선된 대본 내용\",\n    \
             \"key_points\": [\"개선된 포인트 1\", \"개선된 포인트 2\"],\n    \"slide_notes\": \"슬라이드 제안\"\n}}",
            scene.title, scene.narration, instruction, scene.id
        );

        let value = self
            .client
            .generate_json(&prompt, Some(SCRIPT_SYSTEM_PROMPT))
            .await?;
        Ok(merge_scene(scene, &value))
    }
}

/// Build a [`Script`] from the model's JSON.
///
/// Sections without `section_id` are numbered from 1 by position. A section
/// whose `content` is missing or blank makes the whole response unusable.
pub fn parse_script(value: &Value, input: &ScriptInput) -> Result<Script, GenerationError> {
    let sections = value
        .get("sections")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::UnparsableResponse("missing \"sections\" array".into()))?;

    if sections.is_empty() {
        return Err(GenerationError::UnparsableResponse(
            "response contains no sections".into(),
        ));
    }

    let segments = input.storyline_segments();
    let mut scenes = Vec::with_capacity(sections.len());
    for (i, section) in sections.iter().enumerate() {
        let narration = str_field(section, "content")
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::UnparsableResponse(format!("section {} has no content", i + 1))
            })?;

        let id = section
            .get("section_id")
            .and_then(Value::as_u64)
            .map(|id| id as u32)
            .unwrap_or(i as u32 + 1);

        let title = str_field(section, "title")
            .filter(|t| !t.trim().is_empty())
            .or_else(|| segments.get(i).cloned())
            .unwrap_or_else(|| format!("섹션 {}", id));

        scenes.push(Scene {
            id,
            title,
            estimated_duration_sec: estimate_speech_duration(&narration),
            narration,
            bullets: string_list(section.get("key_points")),
            slide_notes: str_field(section, "slide_notes").unwrap_or_default(),
        });
    }

    let mut script = Script {
        title: str_field(value, "title")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| input.topic.clone()),
        description: str_field(value, "description").unwrap_or_default(),
        scenes,
        tags: string_list(value.get("tags")),
        total_duration_sec: 0.0,
    };
    script.calculate_total_duration();
    Ok(script)
}

fn merge_scene(scene: &Scene, value: &Value) -> Scene {
    let narration = str_field(value, "content")
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| scene.narration.clone());
    let bullets = match value.get("key_points") {
        Some(v) if v.is_array() => string_list(Some(v)),
        _ => scene.bullets.clone(),
    };

    Scene {
        id: scene.id,
        title: str_field(value, "title").unwrap_or_else(|| scene.title.clone()),
        estimated_duration_sec: estimate_speech_duration(&narration),
        narration,
        bullets,
        slide_notes: str_field(value, "slide_notes").unwrap_or_else(|| scene.slide_notes.clone()),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
