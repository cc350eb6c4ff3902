//! Fixed instructions and worked examples sent with every oracle request.

/// System instruction describing the transliteration task and reply format.
pub(crate) const SYSTEM_INSTRUCTION: &str = "\
You convert English words into katakana English as used in Japan. Follow these rules strictly.

Input: a newline-separated list of English words.
Output: one CSV row per input word, `word,katakana`, with no header and no other text.

Rules:
- Convert every input word. The number of output rows must equal the number of input words.
- Convert misspelled or unusual words as well.
- Prefer the katakana form commonly used in Japan, e.g. \"orange\" -> \"オレンジ\".
- Read proper nouns, acronyms and abbreviations the way they are usually pronounced, e.g. \"nasa\" -> \"ナサ\".
- Use katakana only. Never output Latin letters, digits or hiragana.
- Transliterate, never translate: \"apple\" -> \"アップル\", not \"りんご\".
- Romanized Japanese is still written in katakana, e.g. \"chugoku\" -> \"チュウゴク\".
- Brand names are spelled out phonetically, e.g. \"directv\" -> \"ディレクティービー\".
- Long or technical nouns are transliterated in full, e.g. \"extrasensory\" -> \"エクストラセンソリー\".
- Rare personal names are transliterated too, e.g. \"fenech\" -> \"フェネック\".
- Demonyms stay phonetic: \"honduran\" -> \"ホンジュラン\", \"kuwaiti\" -> \"クウェーティ\".
- Use the prolonged sound mark where appropriate, e.g. \"computer\" -> \"コンピューター\".
- Write geminate and palatalized sounds precisely, e.g. \"application\" -> \"アプリケーション\".
- Render a plural s, e.g. \"apples\" -> \"アップルズ\".

Output format:
apple,アップル
banana,バナナ
cherry,チェリー
donut,ドーナツ";

/// Worked example request shown to the oracle before every real request.
pub(crate) const EXAMPLE_REQUEST: &str = "\
aaa
aaberg
aachen
aachener
aaker
aalborg
aalburg
aalen
aaliyah
aalseth
alpern
fenech
judo
jujitsu
kuwaiti";

/// Expected answer to [`EXAMPLE_REQUEST`].
pub(crate) const EXAMPLE_RESPONSE: &str = "\
aaa,トリプルエー
aaberg,アーバーグ
aachen,アーヘン
aachener,アーヘナー
aaker,アーカー
aalborg,オールボー
aalburg,アールブルフ
aalen,アーレン
aaliyah,アリーヤ
aalseth,オルセス
alpern,アルペルン
fenech,フェネック
judo,ジュウドー
jujitsu,ジュジツ
kuwaiti,クウェーティ";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{is_katakana, oracle::parse_response};

    #[test]
    fn test_example_response_covers_request() {
        let answer = parse_response(EXAMPLE_RESPONSE).unwrap();
        let requested: Vec<&str> = EXAMPLE_REQUEST.lines().collect();

        assert_eq!(answer.len(), requested.len());
        for word in requested {
            assert!(answer.contains_key(word), "missing {word}");
        }
    }

    #[test]
    fn test_example_response_is_katakana() {
        let answer = parse_response(EXAMPLE_RESPONSE).unwrap();
        assert!(answer.values().all(|v| is_katakana(v)));
    }
}
