//! Shared fixtures: a small labour-law corpus, its validation database, and
//! stub collaborators.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lexcite_ai::{AiError, CrossEncoder, QueryEncoder};
use lexcite_core::{ArticleKey, Provenance, RetrievalCandidate, StatuteChunk};
use lexcite_store::{ArticleRecord, Corpus, HeadingIndex, LawRecord, LexicalIndex, ValidationDatabase, VectorStore};

use crate::config::{EngineConfig, RuleBook};
use crate::fusion::HybridRetriever;
use crate::semantic::SemanticIndex;
use crate::topics::TopicTable;

pub(crate) fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("data")
}

pub(crate) fn rules() -> RuleBook {
    RuleBook::load(&data_dir().join("rules.toml")).unwrap()
}

pub(crate) fn topics() -> TopicTable {
    TopicTable::load(&data_dir().join("topic_guides.toml")).unwrap()
}

pub(crate) fn candidate(law: &str, article: &str, score: f64) -> RetrievalCandidate {
    RetrievalCandidate {
        key: ArticleKey::new(law, article).unwrap(),
        chunk_id: None,
        heading: format!("第 {article} 條"),
        chapter: String::new(),
        text: String::new(),
        score,
        provenance: Provenance::Hybrid,
        boosted_for: None,
    }
}

struct Row {
    id: &'static str,
    law: &'static str,
    article: &'static str,
    chapter: &'static str,
    heading: &'static str,
    text: &'static str,
    phrases: &'static [&'static str],
}

const LSA: &str = "勞動基準法";

const ROWS: &[Row] = &[
    Row {
        id: "lsa-2",
        law: LSA,
        article: "2",
        chapter: "第一章 總則",
        heading: "第 2 條 用詞定義",
        text: "本法用詞，定義如下：一、勞工：指受雇主僱用從事工作獲致工資者。二、工資：指勞工因工作而獲得之報酬。",
        phrases: &["受雇主僱用", "工作獲致工資"],
    },
    Row {
        id: "lsa-7",
        law: LSA,
        article: "7",
        chapter: "第一章 總則",
        heading: "第 7 條 勞工名卡",
        text: "雇主應置備勞工名卡，登記勞工之姓名、性別、出生年月日、本籍、教育程度、住址、身分證統一號碼、到職年月日、工資、勞工保險投保日期、獎懲、傷病及其他必要事項。",
        phrases: &["勞工名卡"],
    },
    Row {
        id: "lsa-10-1",
        law: LSA,
        article: "10-1",
        chapter: "第二章 勞動契約",
        heading: "第 10-1 條 調動勞工工作",
        text: "雇主調動勞工工作，不得違反勞動契約之約定，並應符合下列原則：一、基於企業經營上所必須，且不得有不當動機及目的。",
        phrases: &["調動勞工工作", "企業經營上所必須"],
    },
    Row {
        id: "lsa-11",
        law: LSA,
        article: "11",
        chapter: "第二章 勞動契約",
        heading: "第 11 條 雇主預告終止契約",
        text: "非有左列情事之一者，雇主不得預告勞工終止勞動契約：一、歇業或轉讓時。二、虧損或業務緊縮時。",
        phrases: &["預告勞工終止勞動契約", "歇業或轉讓"],
    },
    Row {
        id: "lsa-12",
        law: LSA,
        article: "12",
        chapter: "第二章 勞動契約",
        heading: "第 12 條 雇主不經預告終止契約",
        text: "勞工有左列情形之一者，雇主得不經預告終止契約：六、無正當理由繼續曠工三日，或一個月內曠工達六日者。",
        phrases: &["不經預告終止契約", "曠工三日"],
    },
    Row {
        id: "lsa-16",
        law: LSA,
        article: "16",
        chapter: "第二章 勞動契約",
        heading: "第 16 條 預告期間",
        text: "雇主依第十一條或第十三條但書規定終止勞動契約者，其預告期間依左列各款之規定：一、繼續工作三個月以上一年未滿者，於十日前預告之。",
        phrases: &["預告期間"],
    },
    Row {
        id: "lsa-17",
        law: LSA,
        article: "17",
        chapter: "第二章 勞動契約",
        heading: "第 17 條 資遣費",
        text: "雇主依前條終止勞動契約者，應依下列規定發給勞工資遣費。",
        phrases: &["資遣費"],
    },
    Row {
        id: "lsa-22",
        law: LSA,
        article: "22",
        chapter: "第三章 工資",
        heading: "第 22 條 工資之給付",
        text: "工資之給付，應以法定通用貨幣為之。 工資應全額直接給付勞工。",
        phrases: &["法定通用貨幣", "全額直接給付"],
    },
    Row {
        id: "lsa-24",
        law: LSA,
        article: "24",
        chapter: "第三章 工資",
        heading: "第 24 條 延長工時之工資",
        text: "雇主延長勞工工作時間者，其延長工作時間之工資，依下列標準加給。",
        phrases: &["延長工作時間之工資"],
    },
    Row {
        id: "lsa-26",
        law: LSA,
        article: "26",
        chapter: "第三章 工資",
        heading: "第 26 條 預扣工資之禁止",
        text: "雇主不得預扣勞工工資作為違約金或賠償費用。",
        phrases: &["預扣勞工工資", "違約金或賠償費用"],
    },
    Row {
        id: "lsa-32",
        law: LSA,
        article: "32",
        chapter: "第四章 工作時間、休息、休假",
        heading: "第 32 條 延長工作時間",
        text: "雇主有使勞工在正常工作時間以外工作之必要者，延長之工作時間連同正常工作時間，一個月不得超過四十六小時。",
        phrases: &["正常工作時間以外"],
    },
    Row {
        id: "lsa-38",
        law: LSA,
        article: "38",
        chapter: "第四章 工作時間、休息、休假",
        heading: "第 38 條 特別休假",
        text: "勞工在同一雇主或事業單位，繼續工作滿一定期間者，應依下列規定給予特別休假。",
        phrases: &["特別休假"],
    },
    Row {
        id: "lsa-51",
        law: LSA,
        article: "51",
        chapter: "第七章 童工、女工",
        heading: "第 51 條 妊娠期間之改調",
        text: "女工在妊娠期間，如有較為輕易之工作，得申請改調，雇主不得拒絕，並不得減少其工資。",
        phrases: &["妊娠期間", "申請改調"],
    },
    Row {
        id: "civ-487",
        law: "民法",
        article: "487",
        chapter: "第二編 債",
        heading: "第 487 條 受領勞務遲延之報酬請求",
        text: "僱用人受領勞務遲延者，受僱人無補服勞務之義務，仍得請求報酬。",
        phrases: &["受領勞務遲延", "請求報酬"],
    },
    Row {
        id: "gea-11",
        law: "性別平等工作法",
        article: "11",
        chapter: "第三章 性別歧視之禁止",
        heading: "第 11 條 離職及解僱之禁止差別待遇",
        text: "雇主對受僱者之退休、資遣、離職及解僱，不得因性別或性傾向而有差別待遇。受僱者懷孕、分娩或育兒時，不得以其為解僱之理由。",
        phrases: &["不得因性別", "差別待遇"],
    },
    Row {
        id: "esa-33",
        law: "就業服務法",
        article: "33",
        chapter: "第四章 促進就業",
        heading: "第 33 條 資遣通報",
        text: "雇主資遣員工時，應於員工離職之十日前，將被資遣員工之姓名、性別、年齡、住址、電話、擔任工作、資遣事由及需否就業輔導等事項，列冊通報當地主管機關及公立就業服務機構。",
        phrases: &["列冊通報"],
    },
    Row {
        id: "lr-2",
        law: "勞工請假規則",
        article: "2",
        chapter: "",
        heading: "第 2 條 婚假",
        text: "勞工結婚者給予婚假八日，工資照給。",
        phrases: &["婚假八日"],
    },
];

pub(crate) fn chunks() -> Vec<StatuteChunk> {
    ROWS.iter()
        .map(|r| StatuteChunk {
            id: r.id.into(),
            key: ArticleKey::new(r.law, r.article).unwrap(),
            chapter: r.chapter.into(),
            heading: r.heading.into(),
            text: r.text.into(),
            title: None,
            tf: BTreeMap::new(),
        })
        .collect()
}

pub(crate) fn corpus() -> Corpus {
    Corpus::from_chunks(chunks())
}

pub(crate) fn validation_db() -> ValidationDatabase {
    let mut laws: BTreeMap<String, LawRecord> = BTreeMap::new();
    for r in ROWS {
        let law = laws.entry(r.law.to_string()).or_insert_with(|| LawRecord {
            version: "2024-07-31".into(),
            ..Default::default()
        });
        law.articles.insert(
            r.article.to_string(),
            ArticleRecord::new(r.heading, r.text, r.phrases.iter().map(|p| p.to_string()).collect()),
        );
    }
    ValidationDatabase::from_laws(laws)
}

/// One-hot embedding per chunk, so each chunk is orthogonal to every other.
pub(crate) fn stub_vectors(corpus: &Corpus) -> VectorStore {
    let dim = corpus.len();
    let rows = corpus
        .chunks()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut v = vec![0.0f32; dim];
            v[i] = 1.0;
            (c.id.clone(), v)
        })
        .collect();
    VectorStore::from_rows(rows).unwrap()
}

/// Always encodes to the same vector.
pub(crate) struct StubEncoder {
    vector: Vec<f32>,
    delay: Duration,
}

impl StubEncoder {
    /// Encodes every query onto `chunk_id`'s one-hot vector.
    pub(crate) fn pointing_at(corpus: &Corpus, chunk_id: &str) -> Self {
        let mut vector = vec![0.0f32; corpus.len()];
        let idx = corpus.chunks().iter().position(|c| c.id == chunk_id).unwrap();
        vector[idx] = 1.0;
        Self {
            vector,
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            vector: vec![1.0; ROWS.len()],
            delay,
        }
    }
}

#[async_trait]
impl QueryEncoder for StubEncoder {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn encode(&self, _text: &str) -> Result<Vec<f32>, AiError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.vector.clone())
    }
}

pub(crate) enum StubReranker {
    /// Scores passages by position, so the fused order is inverted.
    Reverse,
    Failing,
    /// Reverses like `Reverse`, but only after sleeping.
    Slow(Duration),
}

impl StubReranker {
    pub(crate) fn reverse() -> Arc<dyn CrossEncoder> {
        Arc::new(StubReranker::Reverse)
    }

    pub(crate) fn failing() -> Arc<dyn CrossEncoder> {
        Arc::new(StubReranker::Failing)
    }

    pub(crate) fn slow(delay: Duration) -> Arc<dyn CrossEncoder> {
        Arc::new(StubReranker::Slow(delay))
    }
}

#[async_trait]
impl CrossEncoder for StubReranker {
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>, AiError> {
        match self {
            StubReranker::Reverse => Ok((0..passages.len()).map(|i| i as f32).collect()),
            StubReranker::Failing => Err(AiError::Model("reranker offline".into())),
            StubReranker::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok((0..passages.len()).map(|i| i as f32).collect())
            }
        }
    }
}

/// Lexical + heading retriever over the fixture corpus, no embeddings.
pub(crate) fn retriever(reranker: Option<Arc<dyn CrossEncoder>>) -> HybridRetriever {
    retriever_with_timeout(reranker, Duration::from_secs(1))
}

pub(crate) fn retriever_with_timeout(
    reranker: Option<Arc<dyn CrossEncoder>>,
    timeout: Duration,
) -> HybridRetriever {
    let corpus = Arc::new(corpus());
    HybridRetriever::new(
        Arc::clone(&corpus),
        Arc::new(LexicalIndex::build(&corpus)),
        Arc::new(HeadingIndex::build(&corpus)),
        Arc::new(SemanticIndex::new(None, None, Arc::clone(&corpus), timeout)),
        Arc::new(topics()),
        Arc::new(rules()),
        reranker,
        20,
        timeout,
    )
}

/// Write the fixture corpus and validation database under `dir` and return
/// a config pointing at them plus the shipped rule, topic, and graph files.
pub(crate) fn engine_config(dir: &Path) -> EngineConfig {
    let docs: Vec<serde_json::Value> = ROWS
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "law": r.law,
                "article": r.article,
                "chapter": r.chapter,
                "heading": r.heading,
                "text": r.text,
            })
        })
        .collect();
    let corpus_path = dir.join("index.json");
    std::fs::write(&corpus_path, serde_json::to_vec(&serde_json::json!({ "docs": docs })).unwrap()).unwrap();

    let db_path = dir.join("citation_validation.json");
    validation_db().save(&db_path).unwrap();

    let mut cfg = EngineConfig::with_data_dir(&data_dir());
    cfg.corpus = corpus_path;
    cfg.validation_db = db_path;
    cfg
}
