/// Sanitizes instructor-authored rich text (question text, options, explanations).
///
/// Whitelist-based: formatting tags such as <b>, <sub>, <sup> survive, while
/// <script>, <iframe> and event-handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
