use std::path::Path;

use crate::constants::{DATASET_BINDING, EXECUTE_END_TAG, EXECUTE_START_TAG};

/// Plotting rules shared by every code-writing prompt
fn code_requirements(out_path: &Path) -> String {
    format!(
        "Requirements for the code:
1. Assume the DataFrame is already loaded as '{df}'. Do not read any files.
2. Use pandas and matplotlib only (no seaborn).
3. Add a clear title, axis labels, and a legend if needed.
4. Save the figure to '{path}' with dpi=300.
5. Do not call plt.show(). Close all plots with plt.close() at the end.
6. Include every import the code needs; assume nothing is imported.",
        df = DATASET_BINDING,
        path = out_path.display()
    )
}

fn code_field_example() -> String {
    format!("{}\n# valid python code here\n{}", EXECUTE_START_TAG, EXECUTE_END_TAG)
}

/// Prompt for the first chart code
pub fn chart_generation(instruction: &str, out_path: &Path, schema: &str) -> String {
    format!(
        "You are a data visualization expert.
Return your answer strictly as one JSON object:

{{\"python_code\": \"{example}\"}}

Do not add explanations, only the JSON object.

The code should create a visualization from a DataFrame '{df}' with these columns:
{schema}

User instruction: {instruction}

{requirements}",
        example = code_field_example().replace('\n', "\\n"),
        df = DATASET_BINDING,
        schema = schema,
        instruction = instruction.trim(),
        requirements = code_requirements(out_path),
    )
}

/// Prompt asking the critic to review the first chart and improve its code
pub fn chart_reflection(instruction: &str, previous_code: &str, out_path: &Path, schema: &str) -> String {
    format!(
        "You are a data visualization expert.
Critique the chart produced by the original code against the instruction,
then return improved matplotlib code.

Instruction: {instruction}

Original code (for context):
{previous_code}

Return strictly one JSON object with exactly two fields:
{{\"feedback\": \"what is wrong with the chart and how the new code fixes it\",
 \"python_code\": \"{example}\"}}

No Markdown, backticks, or prose outside the JSON object.

Columns available in '{df}':
{schema}

{requirements}",
        instruction = instruction.trim(),
        previous_code = previous_code.trim(),
        example = code_field_example().replace('\n', "\\n"),
        df = DATASET_BINDING,
        schema = schema,
        requirements = code_requirements(out_path),
    )
}

/// Prompt asking the repairer to fix code that raised
pub fn code_repair(code: &str, error: &str, out_path: &Path, schema: &str) -> String {
    format!(
        "You are a Python debugging expert. The code below failed when run.

Code:
{code}

Error:
{error}

Find the root cause and return corrected code. Keep the intent of the
original chart. Return strictly one JSON object:
{{\"diagnosis\": \"root cause and fix applied\", \"python_code\": \"{example}\"}}

Columns available in '{df}':
{schema}

{requirements}",
        code = code.trim(),
        error = error.trim(),
        example = code_field_example().replace('\n', "\\n"),
        df = DATASET_BINDING,
        schema = schema,
        requirements = code_requirements(out_path),
    )
}

/// What the deliverer needs to know to send the report
#[derive(Debug, Clone)]
pub struct EmailBrief<'a> {
    pub report: &'a str,
    pub recipients: &'a [String],
    pub sender: Option<&'a str>,
    pub mail_tool: &'a str,
    /// JSON schema of the mail tool's arguments, when the server published one
    pub tool_schema: Option<&'a serde_json::Value>,
    pub language: &'a str,
}

/// Prompt asking the deliverer to turn the report into one mail-tool call
pub fn email_delivery(brief: &EmailBrief<'_>) -> String {
    let mut prompt = format!(
        "You send a nicely formatted HTML email containing this detailed report:

{report}

Task:
Convert the report into clean, well presented HTML with an appropriate subject
line, written in {language}.",
        report = brief.report.trim(),
        language = brief.language,
    );

    if let Some(sender) = brief.sender {
        prompt.push_str(&format!("\nThe email is sent from {}.", sender));
    }
    if !brief.recipients.is_empty() {
        prompt.push_str(&format!(
            "\nSend it to: {}.",
            brief.recipients.join(", ")
        ));
    }

    prompt.push_str(&format!(
        "\n\nUse only the tool '{tool}'. Reply strictly with one JSON object:
{{\"tool\": \"{tool}\", \"arguments\": {{\"subject\": \"...\", \"body\": \"<html>...</html>\"}}}}",
        tool = brief.mail_tool
    ));

    if let Some(schema) = brief.tool_schema {
        prompt.push_str(&format!("\n\nArguments accepted by '{}':\n{}", brief.mail_tool, schema));
    }

    prompt
}
