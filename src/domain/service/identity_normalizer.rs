//! 名簿データの氏名・電話番号・日付・性別・クラスコードを正規化する純粋関数群。
//!
//! 比較キー（`normalize_name`）は照合専用で、表示用の値には使わない。

use chrono::NaiveDate;
use rand::Rng;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::domain::entity::roster::PhoneInput;
use crate::domain::entity::school_class::Shift;

/// クラスコード内で授業時間帯の文字が置かれる位置（0 始まり）。
/// クラスコードは `<学年><時間帯><連番>` 形式（例: `6M01`）。
pub const SHIFT_CHAR_POSITION: usize = 1;

/// ユーザー名本体（乱数サフィックスを除く）の最大長。
pub const MAX_USERNAME_BASE_LEN: usize = 27;

/// 有効な電話番号とみなす最小桁数（DDD + 9 桁）。
pub const MIN_PHONE_DIGITS: usize = 11;

/// 生徒メールアドレスのドメイン。
pub const EMAIL_DOMAIN: &str = "escola.edu.br";

/// 性別が未設定の場合の値。
pub const GENDER_NOT_INFORMED: &str = "Prefiro não informar";

/// 発音区別符号を取り除く（NFD 分解して結合文字を除外する）。
pub fn strip_diacritics(raw: &str) -> String {
    raw.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 氏名の比較キーを返す。小文字化・発音区別符号除去・空白の正規化を行う。
pub fn normalize_name(raw: &str) -> String {
    collapse_whitespace(&strip_diacritics(raw).to_lowercase())
}

/// 最初の制御文字（CR / LF / TAB 等）以降を切り捨てる。
fn truncate_at_control(raw: &str) -> &str {
    match raw.char_indices().find(|(_, c)| c.is_control()) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

/// 括弧で囲まれた部分（社会名）を返す。閉じ括弧がなければ末尾までを対象にする。
fn parenthesized_segment(raw: &str) -> Option<&str> {
    let open = raw.find('(')?;
    let rest = &raw[open + 1..];
    let segment = match rest.find(')') {
        Some(close) => &rest[..close],
        None => rest,
    };
    Some(segment)
}

/// 表示名を返す。括弧内の社会名があればそれを優先し、なければ氏名全体を整形して返す。
pub fn extract_display_name(raw: &str) -> String {
    let cleaned = truncate_at_control(raw);
    if let Some(segment) = parenthesized_segment(cleaned) {
        let social = collapse_whitespace(segment);
        if !social.is_empty() {
            return social;
        }
    }
    legal_name(raw)
}

/// 括弧部分を除いた法的氏名を返す。
pub fn legal_name(raw: &str) -> String {
    let cleaned = truncate_at_control(raw);
    let without_social = match cleaned.find('(') {
        Some(open) => {
            let head = &cleaned[..open];
            match cleaned[open..].find(')') {
                Some(close) => format!("{} {}", head, &cleaned[open + close + 1..]),
                None => head.to_string(),
            }
        }
        None => cleaned.to_string(),
    };
    collapse_whitespace(&without_social)
}

/// 名簿行の照合に使う比較キー（表示名・法的氏名）。重複は除く。
pub fn match_keys(raw: &str) -> Vec<String> {
    let mut keys = vec![normalize_name(&extract_display_name(raw))];
    let legal = normalize_name(&legal_name(raw));
    if !legal.is_empty() && !keys.contains(&legal) {
        keys.push(legal);
    }
    keys.retain(|k| !k.is_empty());
    keys
}

fn username_token(token: &str) -> String {
    strip_diacritics(token)
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// 乱数サフィックスを付ける前のユーザー名（`first.last`、最大 27 文字）。
/// 使えるトークンがなければ None。
pub fn base_username(display_name: &str) -> Option<String> {
    let tokens: Vec<String> = display_name
        .split_whitespace()
        .map(username_token)
        .filter(|t| !t.is_empty())
        .collect();

    let base = match tokens.as_slice() {
        [] => return None,
        // 1 トークンの場合は先頭と末尾が同じトークンになる
        [only] => format!("{only}.{only}"),
        [first, .., last] => format!("{first}.{last}"),
    };
    Some(base.chars().take(MAX_USERNAME_BASE_LEN).collect())
}

/// ユーザー名を生成する。衝突の確認は行わず、0〜99 の乱数サフィックスで確率的に回避する。
pub fn generate_username(display_name: &str) -> String {
    match base_username(display_name) {
        Some(base) => {
            let suffix: u8 = rand::thread_rng().gen_range(0..100);
            format!("{base}{suffix}")
        }
        None => fallback_username(),
    }
}

fn fallback_username() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("aluno{}", millis.rem_euclid(1_000_000))
}

/// ユーザー名からメールアドレスを組み立てる。
pub fn build_email(username: &str) -> String {
    format!("{username}@{EMAIL_DOMAIN}")
}

fn clean_phone(entry: &str) -> Option<String> {
    let cleaned: String = entry
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '(' | ')' | ' ' | '-'))
        .collect();
    let digits = cleaned.chars().filter(char::is_ascii_digit).count();
    if digits >= MIN_PHONE_DIGITS {
        Some(cleaned.trim().to_string())
    } else {
        None
    }
}

/// 電話番号を検証する。11 桁以上の番号だけを残し `|` で連結する。該当なしは空文字。
pub fn validate_phones(input: &PhoneInput) -> String {
    let entries: Vec<&str> = match input {
        PhoneInput::Single(s) => s.split('|').collect(),
        PhoneInput::List(list) => list.iter().flat_map(|s| s.split('|')).collect(),
    };
    entries
        .into_iter()
        .filter_map(clean_phone)
        .collect::<Vec<_>>()
        .join("|")
}

/// クラスコードから授業時間帯を推定する。判別できない場合は integral。
pub fn infer_shift(class_code: &str) -> Shift {
    match class_code
        .trim()
        .chars()
        .nth(SHIFT_CHAR_POSITION)
        .map(|c| c.to_ascii_uppercase())
    {
        Some('M') => Shift::Matutino,
        Some('V') => Shift::Vespertino,
        Some('N') => Shift::Noturno,
        _ => Shift::Integral,
    }
}

/// `DD/MM/YYYY` を `YYYY-MM-DD` に変換する。既に ISO 形式ならそのまま返す。
/// 日付として不正な値は None。
pub fn reformat_birthdate(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// 性別を正規化する。未設定は「Prefiro não informar」。
pub fn format_gender(raw: Option<&str>) -> String {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return GENDER_NOT_INFORMED.to_string();
    };
    match normalize_name(value).as_str() {
        "m" | "masculino" | "male" => "Masculino".to_string(),
        "f" | "feminino" | "female" => "Feminino".to_string(),
        _ => capitalize(&value.to_lowercase()),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// クラス名と時間帯から説明文を生成する。
pub fn describe_class(name: &str, shift: Shift) -> String {
    format!("Turma {} - {}", name.trim(), shift.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_is_deterministic() {
        assert_eq!(normalize_name("José  DA Silva"), normalize_name("jose da silva"));
        assert_eq!(normalize_name("  JOÃO   Conceição "), "joao conceicao");
    }

    #[test]
    fn test_extract_display_name_prefers_social_name() {
        assert_eq!(extract_display_name("Carlos Pereira (Carla Pereira)"), "Carla Pereira");
        assert_eq!(extract_display_name("  Ana   Maria Souza "), "Ana Maria Souza");
        assert_eq!(extract_display_name("Carlos Pereira ( )"), "Carlos Pereira");
    }

    #[test]
    fn test_extract_display_name_truncates_at_control_chars() {
        assert_eq!(extract_display_name("Maria Lima\r\nlixo"), "Maria Lima");
        assert_eq!(extract_display_name("Pedro Alves (Pietra\tAlves)"), "Pietra");
    }

    #[test]
    fn test_legal_name_removes_social_segment() {
        assert_eq!(legal_name("Carlos Pereira (Carla) Junior"), "Carlos Pereira Junior");
        assert_eq!(legal_name("Carlos Pereira (Carla"), "Carlos Pereira");
    }

    #[test]
    fn test_match_keys_contains_both_names() {
        let keys = match_keys("Carlos Pereira (Carla Pereira)");
        assert_eq!(keys, vec!["carla pereira".to_string(), "carlos pereira".to_string()]);
        assert_eq!(match_keys("João Silva"), vec!["joao silva".to_string()]);
    }

    #[test]
    fn test_generate_username_shape() {
        for _ in 0..50 {
            let username = generate_username("Ana Maria Souza");
            let suffix = username.strip_prefix("ana.souza").unwrap();
            assert!((1..=2).contains(&suffix.len()), "unexpected username {username}");
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));
            assert!(username.len() <= 29);
        }
    }

    #[test]
    fn test_base_username_strips_accents_and_truncates() {
        assert_eq!(base_username("Júlia Conceição").as_deref(), Some("julia.conceicao"));
        assert_eq!(base_username("Ana").as_deref(), Some("ana.ana"));
        let long = base_username("Maximiliano Bartholomeu Vasconcellos-Albuquerque").unwrap();
        assert_eq!(long.len(), MAX_USERNAME_BASE_LEN);
        assert!(long.starts_with("maximiliano.vasconcellos"));
    }

    #[test]
    fn test_generate_username_single_token_uses_it_as_first_and_last() {
        let username = generate_username("Ana");
        let suffix = username.strip_prefix("ana.ana").unwrap();
        assert!((1..=2).contains(&suffix.len()), "unexpected username {username}");
    }

    #[test]
    fn test_generate_username_fallback() {
        let username = generate_username("  ... ");
        let suffix = username.strip_prefix("aluno").unwrap();
        assert!(!suffix.is_empty());
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_validate_phones() {
        assert_eq!(validate_phones(&PhoneInput::Single("11999999999".to_string())), "11999999999");
        assert_eq!(validate_phones(&PhoneInput::Single("123".to_string())), "");
        assert_eq!(
            validate_phones(&PhoneInput::Single("(11) 99999-9999|123|tel: 11 98888-7777".to_string())),
            "(11) 99999-9999|11 98888-7777"
        );
        assert_eq!(
            validate_phones(&PhoneInput::List(vec!["11977776666".to_string(), "".to_string()])),
            "11977776666"
        );
    }

    #[test]
    fn test_infer_shift_table() {
        assert_eq!(infer_shift("6M01"), Shift::Matutino);
        assert_eq!(infer_shift("7V02"), Shift::Vespertino);
        assert_eq!(infer_shift("1N01"), Shift::Noturno);
        assert_eq!(infer_shift("3I01"), Shift::Integral);
        assert_eq!(infer_shift("3X01"), Shift::Integral);
        assert_eq!(infer_shift("6m01"), Shift::Matutino);
        assert_eq!(infer_shift("6"), Shift::Integral);
        assert_eq!(infer_shift(""), Shift::Integral);
    }

    #[test]
    fn test_reformat_birthdate() {
        assert_eq!(reformat_birthdate("05/03/2011").as_deref(), Some("2011-03-05"));
        assert_eq!(reformat_birthdate("2011-03-05").as_deref(), Some("2011-03-05"));
        assert!(reformat_birthdate("31/02/2011").is_none());
        assert!(reformat_birthdate("").is_none());
    }

    #[test]
    fn test_format_gender() {
        assert_eq!(format_gender(Some("F")), "Feminino");
        assert_eq!(format_gender(Some("MASCULINO")), "Masculino");
        assert_eq!(format_gender(Some("NÃO BINÁRIO")), "Não binário");
        assert_eq!(format_gender(None), GENDER_NOT_INFORMED);
        assert_eq!(format_gender(Some("  ")), GENDER_NOT_INFORMED);
    }

    #[test]
    fn test_describe_class() {
        assert_eq!(describe_class("6M01", Shift::Matutino), "Turma 6M01 - Matutino");
        assert_eq!(build_email("ana.souza7"), "ana.souza7@escola.edu.br");
    }
}
