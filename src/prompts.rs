//! Instruction templates sent to the inference service.

/// System message for image captioning.
pub const IMAGE_SYSTEM: &str = "You are an image description assistant. Describe images directly \
and concisely. No thinking process, no <think> tags, just the description.";

/// User instruction for image captioning.
pub const IMAGE_INSTRUCTION: &str = "Provide simply a precise, concise description of this image. \
Focus on key visual elements and main subject. Think twice before you reply.\n\
Use ten words without commas. Don't add any other comment than requested.";

/// Stand-in image content for documents without extractable images.
pub const NO_IMAGES_SENTINEL: &str = "No images found in the PDF";

/// Builds the task-extraction prompt around already-truncated document text.
pub fn task_prompt(text: &str, target_language: &str) -> String {
    format!(
        r#"You are an AI that extracts tasks and due dates from text.

## Instructions:
- Translate everything into {language} language
- Identify all tasks and their due dates from the given text.
- The output format must strictly follow this pattern:
  **"YYYY-MM-DD, Task description"**
- Each task must be on a new line.
- Avoid any other unnecessary comments, spaces, quotes, brackets, etc.
- If there is no specified day in the month use always the first day of the month.

## Examples:

### **Example 1:**
#### **Input:**
"We need to submit the financial report by March 15, 2024. Also, don't forget the team meeting on April 2, 2024."

#### **Output:**
```
2024-03-15, Submit the financial report
2024-04-02, Attend the team meeting
```

### **Example 2:**
#### **Input:**
"The software release is scheduled for June 10, 2024, and the security audit must be completed by June 5, 2024."

#### **Output:**
```
2024-06-05, Complete the security audit
2024-06-10, Release the software
```

### **Example 3:**
#### **Input:**
"I have to organize team building in March 14 2026. Summer camp is planned in August 10 2025."

#### **Output:**
```
2026-03-14, Team building
2025-08-10, Summer camp
```
---

### **Now process the following text:**
{text}
"#,
        language = target_language,
        text = text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_prompt_embeds_language_and_text() {
        let prompt = task_prompt("Pay rent by May 2025.", "Czech");
        assert!(prompt.contains("Translate everything into Czech language"));
        assert!(prompt.ends_with("Pay rent by May 2025.\n"));
    }
}
