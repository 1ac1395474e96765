//! Per-domain keyword lists and their built-in catalogs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marks a keyword whose remainder must end a whitespace token.
pub const SUFFIX_SIGIL: char = '%';

/// The two keyword lists of one label stage.
///
/// `dominant` keywords are checked first and win on conflict (finished products in the
/// ingredient domain, non-food goods in the food domain); `fallback` keywords are only
/// consulted when no dominant keyword matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordLists {
    #[serde(
        rename = "dominant_keywords",
        alias = "finished_keywords",
        alias = "notfood_keywords"
    )]
    pub dominant: Vec<String>,
    #[serde(
        rename = "fallback_keywords",
        alias = "ingredient_keywords",
        alias = "food_keywords"
    )]
    pub fallback: Vec<String>,
}

/// Dominant keywords separated into plain substrings and token suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitKeywords {
    pub literals: Vec<String>,
    pub suffixes: Vec<String>,
}

impl KeywordLists {
    pub fn new<D, F>(dominant: D, fallback: F) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            dominant: dominant.into_iter().map(Into::into).collect(),
            fallback: fallback.into_iter().map(Into::into).collect(),
        }
    }

    /// Split dominant keywords into literals and `%`-prefixed suffixes.
    ///
    /// A trailing sigil (`양념%`) is dropped and the rest kept as a literal.
    pub fn split_dominant(&self) -> SplitKeywords {
        let mut split = SplitKeywords::default();
        for keyword in &self.dominant {
            let keyword = keyword.trim();
            if let Some(suffix) = keyword.strip_prefix(SUFFIX_SIGIL) {
                if !suffix.is_empty() {
                    split.suffixes.push(suffix.to_string());
                }
                continue;
            }
            let literal = keyword.trim_end_matches(SUFFIX_SIGIL);
            if !literal.is_empty() {
                split.literals.push(literal.to_string());
            }
        }
        split
    }

    /// Fallback keywords with blanks removed.
    pub fn fallback_literals(&self) -> Vec<String> {
        self.fallback
            .iter()
            .map(|keyword| keyword.trim())
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Finished-product vs. ingredient keywords shared by the home-shopping catalog.
    pub fn homeshopping_ingredient() -> Self {
        Self::new(
            [
                "라면", "컵라면", "즉석밥", "도시락", "김밥", "피자", "햄버거", "샌드위치",
                "과자", "스낵", "초콜릿", "사탕", "껌", "케이크", "빵", "도넛", "베이커리",
                "음료", "주스", "커피", "차", "아이스크림", "빙수", "유산균", "요구르트",
                "분유", "홍삼", "핫도그", "가공육", "조리완료", "레토르트", "HMR", "즉석",
                "레디밀", "즉석국", "즉석탕", "즉석찌개", "즉석요리", "냉면", "세트", "쫄면",
                "%탕", "%전골", "%국", "%죽", "%게장", "%볶음", "레자몽",
            ],
            BASE_INGREDIENT_KEYWORDS.iter().copied(),
        )
    }

    /// Finished-product vs. ingredient keywords for the marketplace catalog.
    pub fn kok_ingredient() -> Self {
        let mut fallback: Vec<&str> = BASE_INGREDIENT_KEYWORDS.to_vec();
        fallback.extend([
            "만두", "오렌지", "곶감", "절단", "코인", "가래떡", "망고", "동치미",
            "피스타치오", "레몬즙", "차돌박이", "김치",
        ]);
        Self::new(
            [
                "라면", "컵라면", "즉석밥", "도시락", "김밥", "피자", "햄버거", "샌드위치",
                "과자", "스낵", "초콜릿", "사탕", "껌", "케이크", "빵", "도넛", "베이커리",
                "음료", "주스", "커피", "차", "아이스크림", "빙수", "유산균", "요구르트",
                "분유", "홍삼", "생식", "치킨", "치즈볼", "핫도그", "가공육", "조리완료",
                "레토르트", "HMR", "즉석", "레디밀", "국탕", "양념갈비", "새우장", "쿠키",
                "양갱", "송편", "수프", "전병", "약과", "젤리", "오란다", "쉐이크", "즉석국",
                "즉석탕", "즉석요리", "냉면", "쫄면", "막국수", "떡갈비", "밀키트", "백숙",
                "삼계탕", "닭발", "한과", "볶음밥", "떡볶이", "족발", "영양바", "육포",
                "장아찌", "원두", "메밀소바", "쉐프", "셰프", "보충제", "프로틴",
                "%탕", "%전골", "%국", "%죽", "%게장", "%볶음", "%무침", "%말이", "%구이",
                "%구운", "%인분", "%곰탕", "%양념", "%칩", "%떡", "양념%", "%국밥",
                "%불고기", "%전", "%찌개", "%찐", "%볶음밥",
            ],
            fallback,
        )
    }

    /// Non-food vs. food keywords for the home-shopping food flag.
    pub fn homeshopping_food() -> Self {
        Self::new(
            [
                "기능성", "접이식", "유산균", "앰플", "찜기", "셋업", "토너", "알로에", "순금",
                "세라믹", "프라이팬", "쌀통", "쿠션", "LG", "삼성", "우산", "조리기", "푸마",
                "크로커다일", "브라", "제약", "마스크", "아디다스", "드로즈", "트렁크",
                "글루타치온", "팬티", "용기", "립스틱", "밍크", "팬츠", "보험", "냉장고",
                "약품", "프로틴", "루테인", "데비마이어", "혈압", "혈당", "기억력", "개월분",
                "날씬", "밥솥", "24K", "18K", "한국금자산관리", "거래소", "투어", "이불",
                "타파웨어", "웨어", "하의", "상의", "제조기", "버버리", "크로스백", "무스탕",
                "재킷", "집업", "차량", "행주", "티슈", "키트",
            ],
            [
                "쌀", "김치", "라면", "즉석", "밥", "국", "탕", "찌개", "반찬", "떡", "과자",
                "간식", "소스", "조미료", "양념", "김", "생선", "정육", "고기", "햄", "어묵",
                "육포", "우유", "치즈", "계란", "달걀", "두부", "요구르트", "커피", "차",
                "음료", "주스", "홍삼", "분유", "유산균", "곱창", "블루베리", "냉면", "육수",
                "유기농", "아이스크림", "다시마", "인분", "두유", "빙수", "오곡", "단팥",
                "훈제", "장어", "멸치", "해물", "다시팩", "엑스트라버진", "엑스트라 버진",
                "양갱", "만두", "풀무원", "올가", "피자", "고춧가루", "핫도그", "수산물",
                "오징어", "도넛", "자일리톨", "자숙", "구이", "손질", "아구찜", "코코넛오일",
                "복분자", "닭발", "매콤", "젓", "명란", "슬라이스", "낙지", "숙성", "고사리",
                "문어", "데친", "셰프", "소갈비", "굴비",
            ],
        )
    }
}

const BASE_INGREDIENT_KEYWORDS: &[&str] = &[
    "쌀", "콩", "보리", "밀가루", "전분", "고춧가루", "참기름", "간장", "된장", "고추장",
    "소금", "설탕", "양념", "조미료", "다시마", "멸치", "건새우", "다시팩", "원두", "커피원두",
    "야채", "채소", "고사리", "버섯", "시금치", "나물", "마늘", "양파", "감자", "고구마",
    "소고기", "돼지고기", "닭고기", "정육", "계란", "달걀", "두부", "생선", "굴비", "장어",
    "오징어", "새우", "낙지", "홍합", "꽃게", "해물", "육수", "국물", "원재료", "곡물", "견과",
    "깨",
];

/// Errors raised while reading a keyword file.
#[derive(Debug, Error)]
pub enum KeywordFileError {
    #[error("Failed to read keyword file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid keyword file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Keyword file {0} has no dominant keywords")]
    Empty(PathBuf),
}

/// Load keyword lists from a TOML file with `dominant_keywords` / `fallback_keywords`
/// (or the domain names `finished_keywords` / `ingredient_keywords`).
pub fn load_keyword_file(path: &Path) -> Result<KeywordLists, KeywordFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| KeywordFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let lists: KeywordLists = toml::from_str(&text).map_err(|source| KeywordFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if lists.dominant.iter().all(|keyword| keyword.trim().is_empty()) {
        return Err(KeywordFileError::Empty(path.to_path_buf()));
    }
    Ok(lists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn split_separates_suffixes_and_drops_trailing_sigil() {
        let lists = KeywordLists::new(["라면", "%탕", "양념%", "%", " "], ["쌀"]);
        let split = lists.split_dominant();
        assert_eq!(split.literals, vec!["라면", "양념"]);
        assert_eq!(split.suffixes, vec!["탕"]);
    }

    #[test]
    fn builtin_lists_register_suffixes() {
        let split = KeywordLists::kok_ingredient().split_dominant();
        assert!(split.suffixes.iter().any(|suffix| suffix == "탕"));
        assert!(split.literals.iter().any(|literal| literal == "밀키트"));
        assert!(!split.literals.iter().any(|literal| literal.contains(SUFFIX_SIGIL)));
    }

    #[test]
    fn keyword_file_accepts_domain_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keywords.toml");
        std::fs::write(
            &path,
            "finished_keywords = [\"컵라면\", \"%탕\"]\ningredient_keywords = [\"쌀\"]\n",
        )
        .unwrap();
        let lists = load_keyword_file(&path).unwrap();
        assert_eq!(lists.dominant, vec!["컵라면", "%탕"]);
        assert_eq!(lists.fallback, vec!["쌀"]);
    }

    #[test]
    fn keyword_file_without_dominant_keywords_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keywords.toml");
        std::fs::write(&path, "dominant_keywords = []\nfallback_keywords = [\"쌀\"]\n").unwrap();
        assert!(matches!(
            load_keyword_file(&path),
            Err(KeywordFileError::Empty(_))
        ));
    }
}
