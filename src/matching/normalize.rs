// src/matching/normalize.rs
// Product name normalization applied before embedding.

use anyhow::{Context, Result};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

// Portuguese stop-word list (NLTK corpus)
pub const PORTUGUESE_STOPWORDS: [&str; 207] = [
    "a", "à", "ao", "aos", "aquela", "aquelas", "aquele", "aqueles", "aquilo", "as", "às",
    "até", "com", "como", "da", "das", "de", "dela", "delas", "dele", "deles", "depois", "do",
    "dos", "e", "é", "ela", "elas", "ele", "eles", "em", "entre", "era", "eram", "éramos",
    "essa", "essas", "esse", "esses", "esta", "está", "estamos", "estão", "estar", "estas",
    "estava", "estavam", "estávamos", "este", "esteja", "estejam", "estejamos", "estes",
    "esteve", "estive", "estivemos", "estiver", "estivera", "estiveram", "estivéramos",
    "estiverem", "estivermos", "estivesse", "estivessem", "estivéssemos", "estou", "eu", "foi",
    "fomos", "for", "fora", "foram", "fôramos", "forem", "formos", "fosse", "fossem",
    "fôssemos", "fui", "há", "haja", "hajam", "hajamos", "hão", "havemos", "haver", "hei",
    "houve", "houvemos", "houver", "houvera", "houverá", "houveram", "houvéramos", "houverão",
    "houverei", "houverem", "houveremos", "houveria", "houveriam", "houveríamos", "houvermos",
    "houvesse", "houvessem", "houvéssemos", "isso", "isto", "já", "lhe", "lhes", "mais", "mas",
    "me", "mesmo", "meu", "meus", "minha", "minhas", "muito", "na", "não", "nas", "nem", "no",
    "nos", "nós", "nossa", "nossas", "nosso", "nossos", "num", "numa", "o", "os", "ou", "para",
    "pela", "pelas", "pelo", "pelos", "por", "qual", "quando", "que", "quem", "são", "se",
    "seja", "sejam", "sejamos", "sem", "ser", "será", "serão", "serei", "seremos", "seria",
    "seriam", "seríamos", "seu", "seus", "só", "somos", "sou", "sua", "suas", "também", "te",
    "tem", "tém", "temos", "tenha", "tenham", "tenhamos", "tenho", "terá", "terão", "terei",
    "teremos", "teria", "teriam", "teríamos", "teu", "teus", "teve", "tinha", "tinham",
    "tínhamos", "tive", "tivemos", "tiver", "tivera", "tiveram", "tivéramos", "tiverem",
    "tivermos", "tivesse", "tivessem", "tivéssemos", "tu", "tua", "tuas", "um", "uma", "você",
    "vocês", "vos",
];

static PORTUGUESE_STOPWORD_SET: Lazy<HashSet<String>> =
    Lazy::new(|| PORTUGUESE_STOPWORDS.iter().map(|&s| s.to_string()).collect());

pub fn portuguese_stopwords() -> &'static HashSet<String> {
    &PORTUGUESE_STOPWORD_SET
}

/// Loads a newline-separated stop-word file. Blank lines and lines starting
/// with `#` are skipped; entries are lower-cased.
pub fn load_stopwords(path: &Path) -> Result<HashSet<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stop-word file {}", path.display()))?;
    let stopwords: HashSet<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect();
    info!("Loaded {} stop-words from {}", stopwords.len(), path.display());
    Ok(stopwords)
}

/// Lower-cases `name`, splits it into words, drops stop-words and joins the
/// rest with single spaces. Idempotent.
pub fn normalize_product_name(name: &str, stopwords: &HashSet<String>) -> String {
    let lowered = name.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| !stopwords.contains(*word))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_product_names(names: &[String], stopwords: &HashSet<String>) -> Vec<String> {
    names
        .iter()
        .map(|name| normalize_product_name(name, stopwords))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_case_insensitive() {
        let sw = portuguese_stopwords();
        assert_eq!(
            normalize_product_name("Leite Integral", sw),
            normalize_product_name("leite integral", sw)
        );
    }

    #[test]
    fn test_idempotent() {
        let sw = portuguese_stopwords();
        for name in [
            "Leite Integral A",
            "  Café   Torrado e Moído da Fazenda 500g ",
            "Arroz Tipo-1 (Pacote) / 5kg",
            "ÓLEO DE SOJA",
            "",
        ] {
            let once = normalize_product_name(name, sw);
            assert_eq!(normalize_product_name(&once, sw), once, "input: {:?}", name);
        }
    }

    #[test]
    fn test_removes_stopwords_and_punctuation() {
        let sw = portuguese_stopwords();
        assert_eq!(
            normalize_product_name("Café Torrado e Moído da Fazenda, 500g", sw),
            "café torrado moído fazenda 500g"
        );
        assert_eq!(normalize_product_name("Leite Integral A", sw), "leite integral");
    }

    #[test]
    fn test_only_stopwords_yields_empty() {
        let sw = portuguese_stopwords();
        assert_eq!(normalize_product_name("de a o", sw), "");
    }

    #[test]
    fn test_custom_stopword_set() {
        let sw: HashSet<String> = ["the", "of"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            normalize_product_name("The Bread OF Life", &sw),
            "bread life"
        );
    }

    #[test]
    fn test_batch_preserves_order() {
        let sw = portuguese_stopwords();
        let names = vec!["B Item".to_string(), "A Item".to_string()];
        assert_eq!(normalize_product_names(&names, sw), vec!["b item", "item"]);
    }

    #[test]
    fn test_load_stopwords_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# english").unwrap();
        writeln!(file, "The").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  of ").unwrap();
        let sw = load_stopwords(file.path()).unwrap();
        assert_eq!(sw.len(), 2);
        assert!(sw.contains("the"));
        assert!(sw.contains("of"));
    }
}
