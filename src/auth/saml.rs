// SAML ECP login: SP request -> IdP authentication -> assertion back to the SP
use crate::endpoints::Endpoints;
use crate::error::{AuthError, Result};
use crate::http::{self, APPLICATION_PAOS, PAOS, PAOS_ECP_PROFILE, TEXT_XML, X_SUBJECT_TOKEN};
use crate::models::{LoginRequest, TokenResponse};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};

/// Run the three ECP hops. Any failure aborts the whole exchange.
pub async fn authenticate(
    client: &Client,
    endpoints: &Endpoints,
    request: &LoginRequest,
) -> Result<TokenResponse> {
    let idp_name = request.require(&request.idp_name, "idp name")?;
    let idp_url = request.require(&request.idp_url, "idp url")?;
    let username = request.require(&request.username, "username")?;
    let password = request.require(&request.password, "password")?;

    let authn_request = service_provider_request(client, endpoints, idp_name).await?;

    tracing::debug!("Authenticating {} against IdP {}", username, idp_url);
    let response = client
        .post(idp_url)
        .header(CONTENT_TYPE, TEXT_XML)
        .basic_auth(username, Some(password))
        .body(authn_request)
        .send()
        .await?;
    let assertion = http::body_bytes(response).await?;

    let xml = std::str::from_utf8(&assertion)
        .map_err(|e| AuthError::Saml(format!("IdP response is not valid UTF-8: {}", e)))?;
    let consumer_url = assertion_consumer_service_url(xml)?;

    tracing::debug!("Posting assertion to {}", consumer_url);
    let response = client
        .post(&consumer_url)
        .header(CONTENT_TYPE, APPLICATION_PAOS)
        .body(assertion)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::CREATED || !response.headers().contains_key(X_SUBJECT_TOKEN) {
        // Without a token header the body decides between InvalidOtp and AuthenticationFailed.
        return http::cloud_credentials_from_response(response).await;
    }

    let body = response.bytes().await?;
    Err(AuthError::HttpStatus {
        status: status.as_u16(),
        body: http::format_json_body(&body),
    })
}

/// SP-initiated AuthnRequest envelope, passed on to the IdP untouched.
async fn service_provider_request(
    client: &Client,
    endpoints: &Endpoints,
    idp_name: &str,
) -> Result<Vec<u8>> {
    let url = endpoints.federation_auth(idp_name, "saml");
    tracing::debug!("Requesting SAML AuthnRequest from {}", url);

    let response = client
        .get(&url)
        .header(ACCEPT, APPLICATION_PAOS)
        .header(PAOS, PAOS_ECP_PROFILE)
        .send()
        .await?;

    http::body_bytes(response).await
}

/// `AssertionConsumerServiceURL` of the ECP `<Response>` inside the SOAP header.
fn assertion_consumer_service_url(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_header = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"Header" => in_header = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Header" => in_header = false,
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if in_header && e.local_name().as_ref() == b"Response" =>
            {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| AuthError::Saml(format!("bad attribute: {}", e)))?;
                    if attr.key.local_name().as_ref() == b"AssertionConsumerServiceURL" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| AuthError::Saml(format!("bad attribute value: {}", e)))?;
                        return Ok(value.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AuthError::Saml(format!(
                    "error deserializing xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Err(AuthError::Saml(
        "AssertionConsumerServiceURL not found in IdP response".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn idp_response(acs_url: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap11:Envelope xmlns:soap11="http://schemas.xmlsoap.org/soap/envelope/">
  <soap11:Header>
    <ecp:Response xmlns:ecp="urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp" soap11:actor="http://schemas.xmlsoap.org/soap/actor/next" soap11:mustUnderstand="1" AssertionConsumerServiceURL="{}"/>
  </soap11:Header>
  <soap11:Body>
    <saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" ID="_abc"/>
  </soap11:Body>
</soap11:Envelope>"#,
            acs_url
        )
    }

    fn saml_request(idp_url: String) -> LoginRequest {
        let mut request = LoginRequest::new(Protocol::Saml, "d", "eu-de");
        request.username = Some("u".to_string());
        request.password = Some("p".to_string());
        request.idp_name = Some("corp".to_string());
        request.idp_url = Some(idp_url);
        request
    }

    #[test]
    fn test_extracts_consumer_url_from_header() {
        let url = assertion_consumer_service_url(&idp_response(
            "https://iam.eu-de.otc.t-systems.com/v3-ext/auth/OS-FEDERATION/SSO/SAML2/ECP",
        ))
        .unwrap();
        assert_eq!(
            url,
            "https://iam.eu-de.otc.t-systems.com/v3-ext/auth/OS-FEDERATION/SSO/SAML2/ECP"
        );
    }

    #[test]
    fn test_body_response_without_header_is_rejected() {
        let xml = r#"<Envelope><Body><Response AssertionConsumerServiceURL="x"/></Body></Envelope>"#;
        assert!(matches!(
            assertion_consumer_service_url(xml),
            Err(AuthError::Saml(_))
        ));
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        assert!(matches!(
            assertion_consumer_service_url("<Envelope><Header></Body>"),
            Err(AuthError::Saml(_))
        ));
    }

    #[tokio::test]
    async fn test_three_hop_exchange() {
        let server = MockServer::start().await;
        let acs_url = format!("{}/v3-ext/ecp", server.uri());
        let assertion = idp_response(&acs_url);

        Mock::given(method("GET"))
            .and(path(
                "/v3/OS-FEDERATION/identity_providers/corp/protocols/saml/auth",
            ))
            .and(header("accept", APPLICATION_PAOS))
            .and(header("paos", PAOS_ECP_PROFILE))
            .respond_with(ResponseTemplate::new(200).set_body_string("<AuthnRequest/>"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/idp/ecp"))
            .and(header("content-type", TEXT_XML))
            .and(body_string("<AuthnRequest/>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(assertion.clone()))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v3-ext/ecp"))
            .and(header("content-type", APPLICATION_PAOS))
            .and(body_string(assertion))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header(X_SUBJECT_TOKEN, "saml-token")
                    .set_body_json(serde_json::json!({
                        "token": {
                            "expires_at": "2030-01-01T00:00:00Z",
                            "user": {"domain": {"id": "d1", "name": "d"}, "name": "u"}
                        }
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoints = Endpoints::with_base(&format!("{}/v3", server.uri()));
        let request = saml_request(format!("{}/idp/ecp", server.uri()));
        let token = authenticate(&Client::new(), &endpoints, &request)
            .await
            .unwrap();
        assert_eq!(token.token.secret, "saml-token");
    }

    async fn mount_first_hops(server: &MockServer) {
        let assertion = idp_response(&format!("{}/v3-ext/ecp", server.uri()));
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<AuthnRequest/>"))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/idp/ecp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(assertion))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_unconfirmed_assertion_keeps_sp_body() {
        let server = MockServer::start().await;
        mount_first_hops(&server).await;
        Mock::given(method("POST"))
            .and(path("/v3-ext/ecp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(X_SUBJECT_TOKEN, "unconfirmed")
                    .set_body_json(serde_json::json!({"error": {"message": "assertion expired"}})),
            )
            .mount(&server)
            .await;

        let endpoints = Endpoints::with_base(&format!("{}/v3", server.uri()));
        let request = saml_request(format!("{}/idp/ecp", server.uri()));
        match authenticate(&Client::new(), &endpoints, &request).await {
            Err(AuthError::HttpStatus { status, body }) => {
                assert_eq!(status, 200);
                assert!(body.contains("assertion expired"));
            }
            other => panic!("expected HttpStatus, got {:?}", other.map(|t| t.token.secret)),
        }
    }

    #[tokio::test]
    async fn test_missing_token_header_is_authentication_failure() {
        let server = MockServer::start().await;
        mount_first_hops(&server).await;
        Mock::given(method("POST"))
            .and(path("/v3-ext/ecp"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": {"message": "not federated"}})),
            )
            .mount(&server)
            .await;

        let endpoints = Endpoints::with_base(&format!("{}/v3", server.uri()));
        let request = saml_request(format!("{}/idp/ecp", server.uri()));
        assert!(matches!(
            authenticate(&Client::new(), &endpoints, &request).await,
            Err(AuthError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_idp_rejection_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<AuthnRequest/>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/idp/ecp"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let endpoints = Endpoints::with_base(&format!("{}/v3", server.uri()));
        let request = saml_request(format!("{}/idp/ecp", server.uri()));
        assert!(matches!(
            authenticate(&Client::new(), &endpoints, &request).await,
            Err(AuthError::HttpStatus { status: 401, .. })
        ));
    }
}
