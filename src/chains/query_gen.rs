//! Query generator chain

use super::dialect_label;
use crate::conversation::{Conversation, Message};
use crate::llm::{LanguageModel, ModelRequest};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const QUERY_GEN_INSTRUCTION: &str = r#"당신은 세부 사항에 대한 높은 주의력을 가진 SQL 전문가입니다.

당신은 SQL 쿼리를 정의하고, 쿼리 결과를 분석하며, 이를 해석하여 질문에 대한 답변을 도출할 수 있습니다.

아래 메시지를 읽고 사용자의 질문, 테이블 스키마, 쿼리문, 그리고 쿼리 결과 또는 오류가 있는지 식별하세요.

사용자 질문에서 지역명은 적절하게 추출해서 사용하세요.(예: 서울시 -> 서울, 경기도 -> 경기)

menu_type은 결과에 따라 적절하게 변형해서 사용하세요.(예: 멕시코 -> 멕시칸, 중국집 -> 중식, 일본 음식 -> 일식 등...)

1. 질문에 대한 적절한 쿼리 결과가 존재하지 않는 경우, 사용자의 질문을 해결할 수 있는 구문적으로 올바른 {dialect} 쿼리를 생성하세요. 단, 데이터베이스에 영향을 주는 DML 문(INSERT, UPDATE, DELETE, DROP 등)은 절대 사용하지 마세요.

2. 새로운 쿼리를 생성할 경우, 오직 쿼리문만 반환해야 하며, 반드시 '=' 대신 LIKE 연산자를 사용해야 합니다. 또한, 'restaurants' 테이블과 'menus' 테이블을 LEFT JOIN으로 조인해야 합니다.
    그리고 쿼리에서 모든 컬럼의 이름을 명시적으로 호출해야 합니다.
    예를 들어:
    "SELECT r.id AS restaurant_id, r.name AS restaurant_name, r.address, r.station_name, r.lat, r.lng, r.review,
    m.id AS menu_id, m.restaurant_id AS menu_restaurant_id, m.menu_name AS menu_name
    FROM restaurants r LEFT JOIN menus m ON r.id = m.restaurant_id
    WHERE r.station_name LIKE '%논현역%' or r.address LIKE '%논현동%';"

3. 이미 실행된 쿼리가 오류를 발생시킨 경우, 동일한 오류 메시지를 그대로 반환하세요.
    예를 들어: "Error: Pets 테이블이 존재하지 않습니다."

4. 쿼리가 성공적으로 실행되었을 경우, 쿼리의 결과를 컬럼명과 모든 정보를 그대로 반환하세요:
    "Answer: <<쿼리의 결과>>"
    예를 들어: "Answer: restaurant_id, restaurant_name, address, station_name, lat, lng, review, menu_id, menu_restaurant_id, menu_name
    (1, '논현동 맛집', '논현동', '논현역', 37.514352, 127.014352, '맛집 후기', 1, 1, '피자'),
    (2, '논현동 맛집', '논현동', '논현역', 37.514352, 127.014352, '맛집 후기', 2, 1, '스테이크')"

Here is Table information:
{table_info}
"#;

/// Produces a SQL statement, an `Answer:` text, or an echoed `Error:` from
/// the conversation so far. The schema is fixed when the generator is built.
pub struct QueryGenerator {
    model: Arc<dyn LanguageModel>,
    system: String,
}

impl QueryGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, dialect: &str, table_info: &str) -> Self {
        let system = QUERY_GEN_INSTRUCTION
            .replace("{dialect}", dialect_label(dialect))
            .replace("{table_info}", table_info);
        Self { model, system }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    pub async fn generate(&self, conversation: &Conversation) -> Result<Message> {
        let request = ModelRequest::new(conversation.messages().cloned().collect())
            .with_system(self.system.clone());

        let response = self.model.generate(request).await?;
        debug!(chars = response.content.chars().count(), "Query generator replied");
        Ok(response.into_message())
    }
}
