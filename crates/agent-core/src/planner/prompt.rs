//! System prompt for tool-calling planners.

use chrono::{DateTime, TimeZone};

const CAPABILITIES: &str = "\
* You are operating a web browser in fullscreen mode to complete a task for the user. The task is given in <USER_TASK>.
* <USER_DATA> holds information about the user that is always true. It may or may not be relevant to the task.
* The mouse cursor is drawn on every screenshot as an arrow, and its position is also given as text: \"After action mouse cursor is at X: <NUMBER>, Y: <NUMBER>\".
* A gray bar on the right edge of each screenshot shows which part of the page is visible.
* Open tabs are listed with their tab_id. Use the switch_tab tool to change tabs.
* You cannot scroll with a mouse wheel. Use the Page_Down or Page_Up key to scroll.
* Always call a tool. Call stop_browsing when the task is complete or cannot be completed.";

const GUIDELINES: &str = "\
* Fill forms using the information in <USER_DATA>.
* Scroll until the CONTINUE, NEXT or SUBMIT button of a form is visible before submitting it.
* Scroll a UI element fully into view before interacting with it.
* Do not move the mouse to the coordinates where it already is. To click there, use left_click.
* Re-plan after each click, type or key action.
* Move the mouse to the center of a UI element before hovering or clicking it.
* Before each tool call, describe the current state of the page and what you are trying to accomplish.";

/// Builds the system prompt. `instructions` are appended as extra bullets.
pub fn system_prompt<Tz>(instructions: &[String], now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut prompt = String::with_capacity(CAPABILITIES.len() + GUIDELINES.len() + 256);
    prompt.push_str("<SYSTEM_CAPABILITY>\n");
    prompt.push_str(CAPABILITIES);
    prompt.push_str(&format!(
        "\n* The current date is {}.\n</SYSTEM_CAPABILITY>\n\n<IMPORTANT>\n",
        now.format("%A, %B %-d, %Y %H:%M %Z")
    ));
    prompt.push_str(GUIDELINES);
    for instruction in instructions {
        let instruction = instruction.trim();
        if !instruction.is_empty() {
            prompt.push_str("\n* ");
            prompt.push_str(instruction);
        }
    }
    prompt.push_str("\n</IMPORTANT>");
    prompt
}
