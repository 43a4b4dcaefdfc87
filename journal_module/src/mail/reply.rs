/// Isolates the user's newly written text from quoted reply history.
///
/// Paragraphs are blank-line delimited; lines inside a paragraph are joined
/// with single spaces. The first completed paragraph containing `to_address`
/// is the quote marker ("On <date>, <address> wrote:"), and it plus
/// everything after it is dropped. A body with no blank-line structure at
/// all and no marker comes back verbatim.
pub fn extract_reply(body: &str, to_address: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut saw_blank = false;

    for line in body.lines() {
        if line.trim().is_empty() {
            saw_blank = true;
            if !current.is_empty() {
                let paragraph = current.join(" ");
                current.clear();
                if paragraph.contains(to_address) {
                    return paragraphs.join("\n\n");
                }
                paragraphs.push(paragraph);
            }
            continue;
        }
        current.push(line.trim());
    }

    if !current.is_empty() {
        let paragraph = current.join(" ");
        if paragraph.contains(to_address) {
            return paragraphs.join("\n\n");
        }
        if paragraphs.is_empty() && !saw_blank {
            return body.to_string();
        }
        paragraphs.push(paragraph);
    }

    paragraphs.join("\n\n")
}
