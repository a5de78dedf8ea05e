//! Testing utilities and mock implementations.
//!
//! Every external collaborator of the pipeline has a mock here, so jobs can
//! be driven end to end without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use briefsmith_core::testing::{MockLlmClient, MockUploader};
//!
//! let llm = MockLlmClient::new();
//! llm.push_response(r#"{"Introduction": "..."}"#).await;
//!
//! let uploader = MockUploader::new();
//! // ... run a job ...
//! assert_eq!(uploader.uploads().await.len(), 1);
//! ```

mod mock_llm;
mod mock_renderer;
mod mock_speech;
mod mock_stager;
mod mock_tier;
mod mock_uploader;
mod recording_sink;

pub use mock_llm::MockLlmClient;
pub use mock_renderer::MockRenderer;
pub use mock_speech::MockSpeechApi;
pub use mock_stager::MockStager;
pub use mock_tier::MockTier;
pub use mock_uploader::{MockUploader, RecordedUpload};
pub use recording_sink::RecordingSink;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io::{Cursor, Write};

    /// A 16-bit mono PCM WAV file of `secs` seconds of silence.
    pub fn wav_bytes(sample_rate: u32, secs: f64) -> Vec<u8> {
        let samples = (f64::from(sample_rate) * secs).round() as u32;
        let data_len = samples * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(44 + data_len as usize, 0);
        out
    }

    /// A `word/document.xml` wrapping `body` in a namespaced document.
    pub fn wordml_document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
    }

    /// A minimal DOCX archive with one paragraph per entry.
    pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        docx_archive(&body)
    }

    /// A DOCX archive whose paragraphs carry the given style ids.
    pub fn styled_docx_bytes(paragraphs: &[(Option<&str>, &str)]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|(style, text)| {
                let ppr = style
                    .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#, s))
                    .unwrap_or_default();
                format!("<w:p>{}<w:r><w:t>{}</w:t></w:r></w:p>", ppr, text)
            })
            .collect();
        docx_archive(&body)
    }

    /// Packs a WordprocessingML body into a DOCX archive.
    pub fn docx_archive(body: &str) -> Vec<u8> {
        let document = wordml_document(body);

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).expect("in-memory zip write");
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .expect("in-memory zip write");
        zip.start_file("word/document.xml", options).expect("in-memory zip write");
        zip.write_all(document.as_bytes()).expect("in-memory zip write");
        zip.finish().expect("in-memory zip write").into_inner()
    }

    /// Plain-text source material long enough to summarize.
    pub fn sample_text() -> &'static str {
        "The city transit authority requests proposals for a fare collection system. \
         Vendors must support contactless cards and mobile wallets. The pilot starts in \
         March and the full rollout is due by December. The budget is capped at two \
         million dollars, including three years of maintenance."
    }

    /// A JSON response covering every requested section.
    pub fn sections_json(sections: &[String]) -> String {
        let map: serde_json::Map<String, serde_json::Value> = sections
            .iter()
            .map(|s| (s.clone(), serde_json::Value::String(format!("Content for {}.", s))))
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}
