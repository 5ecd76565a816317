//! Secureframe's GraphQL API as a [`Catalog`].
//!
//! The API is undocumented; the two operations below are the ones the web
//! dashboard issues. Listing returns every company test, so framework
//! filtering happens client-side.

use std::cell::Cell;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sfsync_core::ErrorCode;
use sfsync_core::catalog::Catalog;
use sfsync_core::config::{CatalogConfig, HttpConfig};
use sfsync_core::model::{AssertionResult, Resourceable, Test};
use tracing::{debug, info};

use crate::http;
use crate::output::CodedError;

const LIST_OPERATION: &str = "GetCompanyTestV2sQuery";
const DETAIL_OPERATION: &str = "getCompanyTest";
const LIST_PER_PAGE: u32 = 5000;
const DETAIL_ASSERTION_LIMIT: u32 = 3000;

const LIST_QUERY: &str = r"
query GetCompanyTestV2sQuery($searchkick: CompanyTestSearchkickInput) {
  searchCompanyTests(searchkick: $searchkick) {
    data {
      collection {
        ...CompanyTestFields
      }
    }
  }
}

fragment CompanyTestFields on CompanyTest {
  id
  pass
  enabled
  disabledJustification
  testV2 {
    id
    key
    title
    description
    recommendedAction
    detailedRemediationSteps
    controlV2s {
      frameworks {
        key
      }
    }
  }
}
";

const DETAIL_QUERY: &str = r"
query getCompanyTest($id: ID!, $page: Int, $limit: Int, $pass: Boolean) {
  getCompanyTest(id: $id) {
    id
    pass
    enabled
    disabledJustification
    testV2 {
      id
      key
      title
      description
      recommendedAction
      detailedRemediationSteps
      controlV2s {
        frameworks {
          key
        }
      }
    }
    assertionResults(page: $page, limit: $limit, pass: $pass) {
      collection {
        pass
        enabled
        failMessage
        data
        resourceable {
          ...FailingResource
        }
      }
    }
  }
}

fragment FailingResource on Resourceable {
  ... on CompanyUser {
    companyUserName: name
  }
  ... on CloudResource {
    cloudResourceType
    region
    account
    thirdPartyId
    description
    name
  }
  ... on Device {
    deviceName
  }
  ... on Vendor {
    vendorName: name
  }
  ... on Repository {
    repositoryName: name
  }
  ... on CompanyUserVendor {
    email
    companyUser {
      companyUserName: name
    }
  }
}
";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload<'a> {
    operation_name: &'a str,
    variables: Variables<'a>,
    query: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct Variables<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    searchkick: Option<SearchKick>,
    current_company_user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pass: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchKick {
    page: u32,
    per_page: u32,
    query: &'static str,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    #[serde(default)]
    errors: Vec<GraphQlError>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListData {
    search_company_tests: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    data: Collection<WireCompanyTest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailData {
    get_company_test: WireCompanyTest,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Collection<T> {
    #[serde(default)]
    collection: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCompanyTest {
    id: String,
    pass: Option<bool>,
    enabled: Option<bool>,
    disabled_justification: Option<String>,
    test_v2: Option<WireTestV2>,
    assertion_results: Option<Collection<WireAssertionResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTestV2 {
    key: Option<String>,
    title: Option<String>,
    description: Option<String>,
    recommended_action: Option<String>,
    detailed_remediation_steps: Option<String>,
    #[serde(default)]
    control_v2s: Vec<WireControl>,
}

#[derive(Debug, Deserialize)]
struct WireControl {
    #[serde(default)]
    frameworks: Vec<WireFramework>,
}

#[derive(Debug, Deserialize)]
struct WireFramework {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAssertionResult {
    pass: Option<bool>,
    enabled: Option<bool>,
    fail_message: Option<String>,
    data: Option<WireAssertionData>,
    resourceable: Option<WireResource>,
}

#[derive(Debug, Deserialize)]
struct WireAssertionData {
    #[serde(rename = "type")]
    kind: Option<StringOrArray>,
}

/// The `type` tag arrives as either one string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrArray {
    One(String),
    Many(Vec<String>),
}

impl From<StringOrArray> for Vec<String> {
    fn from(value: StringOrArray) -> Self {
        match value {
            StringOrArray::One(one) => vec![one],
            StringOrArray::Many(many) => many,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResource {
    vendor_name: Option<String>,
    account: Option<String>,
    cloud_resource_type: Option<String>,
    region: Option<String>,
    company_user_name: Option<String>,
    repository_name: Option<String>,
    email: Option<String>,
    device_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
    third_party_id: Option<String>,
    company_user: Option<WireCompanyUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCompanyUser {
    company_user_name: Option<String>,
}

impl From<WireResource> for Resourceable {
    fn from(wire: WireResource) -> Self {
        let user_name = wire
            .company_user_name
            .or_else(|| wire.company_user.and_then(|u| u.company_user_name));

        Self {
            vendor_name: wire.vendor_name.unwrap_or_default(),
            account: wire.account.unwrap_or_default(),
            cloud_resource_type: wire.cloud_resource_type.unwrap_or_default(),
            region: wire.region.unwrap_or_default(),
            user_name: user_name.unwrap_or_default(),
            repository_name: wire.repository_name.unwrap_or_default(),
            email: wire.email.unwrap_or_default(),
            device_name: wire.device_name.unwrap_or_default(),
            name: wire.name.unwrap_or_default(),
            description: wire.description.unwrap_or_default(),
            third_party_id: wire.third_party_id.unwrap_or_default(),
        }
    }
}

impl From<WireAssertionResult> for AssertionResult {
    fn from(wire: WireAssertionResult) -> Self {
        Self {
            pass: wire.pass.unwrap_or(false),
            enabled: wire.enabled.unwrap_or(true),
            fail_message: wire.fail_message,
            resource: wire.resourceable.map(Resourceable::from),
            assertion_type: wire
                .data
                .and_then(|data| data.kind)
                .map(Vec::from)
                .unwrap_or_default(),
        }
    }
}

impl From<WireCompanyTest> for Test {
    fn from(wire: WireCompanyTest) -> Self {
        let v2 = wire.test_v2.unwrap_or_default();

        let mut frameworks: Vec<String> = Vec::new();
        for framework in v2.control_v2s.into_iter().flat_map(|c| c.frameworks) {
            if !frameworks.contains(&framework.key) {
                frameworks.push(framework.key);
            }
        }

        Self {
            id: wire.id,
            key: v2.key.unwrap_or_default(),
            title: v2.title.unwrap_or_default(),
            description: v2.description.unwrap_or_default(),
            enabled: wire.enabled.unwrap_or(false),
            pass: wire.pass.unwrap_or(false),
            disabled_justification: wire.disabled_justification,
            recommended_action: v2.recommended_action.unwrap_or_default(),
            remediation_steps: v2.detailed_remediation_steps.unwrap_or_default(),
            frameworks,
            assertions: wire
                .assertion_results
                .map(|results| results.collection.into_iter().map(Into::into).collect())
                .unwrap_or_default(),
        }
    }
}

/// Blocking GraphQL client for one company.
pub struct SecureframeClient {
    agent: ureq::Agent,
    endpoint: String,
    authorization: String,
    company_id: String,
    retry_delay: Duration,
    detail_delay: Duration,
    requests: Cell<usize>,
}

impl SecureframeClient {
    pub fn new(token: &str, company_id: String, catalog: &CatalogConfig, http: &HttpConfig) -> Self {
        Self {
            agent: http::agent(http),
            endpoint: catalog.endpoint.clone(),
            authorization: authorization_header(token),
            company_id,
            retry_delay: Duration::from_millis(http.retry_delay_ms),
            detail_delay: Duration::from_millis(catalog.detail_delay_ms),
            requests: Cell::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn query<T: DeserializeOwned>(&self, payload: &Payload<'_>) -> Result<T> {
        self.requests.set(self.requests.get() + 1);
        let scheme = self.authorization.split(' ').next().unwrap_or_default();
        debug!(
            operation = payload.operation_name,
            endpoint = %self.endpoint,
            scheme,
            "Secureframe request"
        );

        let response = http::send_with_retry(self.retry_delay, || {
            self.agent
                .post(&self.endpoint)
                .set("Authorization", &self.authorization)
                .set("Content-Type", "application/json")
                .send_json(payload)
        })
        .map_err(|err| {
            CodedError::new(
                ErrorCode::CatalogRequestFailed,
                format!("{} failed: {:#}", payload.operation_name, http::describe(err)),
            )
        })?;

        let decoded: GraphQlResponse<T> = response.into_json().map_err(|err| {
            CodedError::new(
                ErrorCode::CatalogRequestFailed,
                format!("{}: failed to decode response: {err}", payload.operation_name),
            )
        })?;

        unwrap_data(payload.operation_name, decoded)
    }
}

impl Catalog for SecureframeClient {
    fn fetch_tests(&self, report_key: &str) -> Result<Vec<Test>> {
        let payload = Payload {
            operation_name: LIST_OPERATION,
            variables: Variables {
                searchkick: Some(SearchKick {
                    page: 1,
                    per_page: LIST_PER_PAGE,
                    query: "*",
                }),
                current_company_user_id: &self.company_id,
                ..Variables::default()
            },
            query: LIST_QUERY,
        };

        let data: ListData = self.query(&payload)?;
        let all = data.search_company_tests.data.collection;
        info!(count = all.len(), "Secureframe returned company tests");

        let tests = filter_by_framework(all.into_iter().map(Test::from), report_key);
        info!(report_key, count = tests.len(), "kept tests for framework");
        Ok(tests)
    }

    fn fetch_test_detail(&self, id: &str) -> Result<Test> {
        let payload = Payload {
            operation_name: DETAIL_OPERATION,
            variables: Variables {
                current_company_user_id: &self.company_id,
                id: Some(id),
                page: Some(1),
                limit: Some(DETAIL_ASSERTION_LIMIT),
                pass: Some(false),
                ..Variables::default()
            },
            query: DETAIL_QUERY,
        };

        let data: DetailData = self.query(&payload)?;
        std::thread::sleep(self.detail_delay);
        Ok(Test::from(data.get_company_test))
    }
}

/// `Authorization` value: used verbatim when it already names a scheme.
fn authorization_header(token: &str) -> String {
    if token.contains(' ') {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

fn unwrap_data<T>(operation: &str, response: GraphQlResponse<T>) -> Result<T> {
    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(CodedError::new(
            ErrorCode::CatalogRejected,
            format!("{operation}: API returned errors: {}", messages.join("; ")),
        )
        .into());
    }

    response
        .data
        .ok_or_else(|| anyhow!("{operation}: response carried no data"))
}

fn filter_by_framework(tests: impl Iterator<Item = Test>, report_key: &str) -> Vec<Test> {
    tests
        .filter(|test| test.frameworks.iter().any(|key| key == report_key))
        .collect()
}
