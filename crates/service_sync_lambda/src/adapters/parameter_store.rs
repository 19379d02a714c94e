use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::primitives::DateTimeFormat;
use service_sync_core::parameters::{
    ParameterStore, ParameterStoreError, ParameterType, StoredParameter,
};

pub struct SsmParameterStore {
    ssm_client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(ssm_client: aws_sdk_ssm::Client) -> Self {
        Self { ssm_client }
    }
}

impl ParameterStore for SsmParameterStore {
    fn get_parameter(
        &self,
        name: &str,
        with_decryption: bool,
    ) -> Result<StoredParameter, ParameterStoreError> {
        let parameter_name = name.to_string();
        let client = self.ssm_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_parameter()
                    .name(parameter_name)
                    .with_decryption(with_decryption)
                    .send()
                    .await
                    .map_err(parameter_store_error)?;
                let parameter = output.parameter().ok_or(ParameterStoreError::NotFound)?;

                Ok(StoredParameter {
                    name: parameter.name().unwrap_or_default().to_string(),
                    value: parameter.value().unwrap_or_default().to_string(),
                    parameter_type: parameter.r#type().map(|kind| kind.as_str().to_string()),
                    version: parameter.version(),
                    last_modified_date: parameter
                        .last_modified_date()
                        .and_then(|date| date.fmt(DateTimeFormat::DateTime).ok()),
                    arn: parameter.arn().map(str::to_string),
                    data_type: parameter.data_type().map(str::to_string),
                })
            })
        })
    }

    fn put_parameter(
        &self,
        name: &str,
        value: &str,
        parameter_type: ParameterType,
        overwrite: bool,
    ) -> Result<i64, ParameterStoreError> {
        let parameter_name = name.to_string();
        let parameter_value = value.to_string();
        let client = self.ssm_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_parameter()
                    .name(parameter_name)
                    .value(parameter_value)
                    .r#type(aws_sdk_ssm::types::ParameterType::from(parameter_type.as_str()))
                    .overwrite(overwrite)
                    .send()
                    .await
                    .map(|output| output.version())
                    .map_err(parameter_store_error)
            })
        })
    }
}

fn parameter_store_error<E, R>(error: SdkError<E, R>) -> ParameterStoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match error.code() {
        Some(code) => ParameterStoreError::from_code(code, error.message().unwrap_or_default()),
        None => ParameterStoreError::Transport(DisplayErrorContext(&error).to_string()),
    }
}
