//! Cosmetic touch-ups on provider output.

/// Formal endings softened to chat register. No pattern overlaps another or
/// appears in any replacement, so application order does not matter.
const SOFTENINGS: &[(&str, &str)] = &[
    ("ありがとうございます", "ありがとう"),
    ("おめでとうございます", "おめでとう"),
    ("でしょうか？", "かな？"),
    ("ですね。", "だね。"),
    ("ですよ。", "だよ。"),
];

pub fn postprocess(translated: &str) -> String {
    SOFTENINGS
        .iter()
        .fold(translated.to_string(), |acc, (from, to)| {
            if acc.contains(from) {
                acc.replace(from, to)
            } else {
                acc
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softens_formal_endings() {
        assert_eq!(postprocess("配信ありがとうございます"), "配信ありがとう");
        assert_eq!(postprocess("いい天気ですね。"), "いい天気だね。");
        assert_eq!(postprocess("本当でしょうか？"), "本当かな？");
    }

    #[test]
    fn order_of_rules_is_irrelevant() {
        let input = "誕生日おめでとうございます！楽しいですよ。そうでしょうか？";
        let forward = postprocess(input);
        let reversed = SOFTENINGS
            .iter()
            .rev()
            .fold(input.to_string(), |acc, (from, to)| acc.replace(from, to));
        assert_eq!(forward, reversed);
        assert_eq!(forward, "誕生日おめでとう！楽しいだよ。そうかな？");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(postprocess("hello"), "hello");
        assert_eq!(postprocess(""), "");
    }
}
